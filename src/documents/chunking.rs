//! Word-boundary text splitter with overlap.

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Splits `text` into chunks of at most `chunk_size` characters, breaking
/// only at whitespace. Each chunk after the first starts with the trailing
/// words of its predecessor, up to `overlap` characters. A single word
/// longer than `chunk_size` becomes a chunk of its own.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size / 2);
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = start;
        let mut len = 0;
        while end < words.len() {
            let added = words[end].chars().count() + usize::from(end > start);
            if end > start && len + added > chunk_size {
                break;
            }
            len += added;
            end += 1;
        }
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }

        let mut next = end;
        let mut carried = 0;
        while next > start + 1 {
            let added = words[next - 1].chars().count() + 1;
            if carried + added > overlap {
                break;
            }
            carried += added;
            next -= 1;
        }
        start = next;
    }
    chunks
}
