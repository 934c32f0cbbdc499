use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const CHECKED_EXTENSIONS: &[&str] = &["rs", "yaml", "toml"];

const CHECKED_ROOTS: &[&str] = &["src", "build.rs", "Cargo.toml", "workflow.yaml"];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");

    let sha = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=PROPOSAL_DESIGNER_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(&manifest_dir);
    let files = collect_files_to_check(&root);

    for file in &files {
        println!("cargo:rerun-if-changed={}", file.display());
    }

    enforce_line_limits(&root, &files);
    enforce_no_dead_code_allows(&root, &files);
    enforce_no_test_skips(&root, &files);
    enforce_serial_for_env_mutations(&root, &files);
}

fn collect_files_to_check(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in CHECKED_ROOTS {
        let path = root.join(entry);
        if path.is_dir() {
            walk_directory(&path, &mut files);
        } else if path.is_file() && has_checked_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    files
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_directory(&path, files);
        } else if has_checked_extension(&path) {
            files.push(path);
        }
    }
}

fn has_checked_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CHECKED_EXTENSIONS.contains(&ext))
}

fn rust_sources(files: &[PathBuf]) -> impl Iterator<Item = &PathBuf> {
    files.iter().filter(|p| {
        p.extension().and_then(|e| e.to_str()) == Some("rs")
            && p.file_name().and_then(|n| n.to_str()) != Some("build.rs")
    })
}

fn relative(root: &Path, file: &Path) -> PathBuf {
    file.strip_prefix(root).unwrap_or(file).to_path_buf()
}

fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in files {
        match std::fs::read_to_string(file) {
            Ok(content) => {
                let line_count = content
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .count();
                if line_count > MAX_LINES {
                    violations.push((relative(root, file), line_count));
                }
            }
            Err(e) => {
                println!(
                    "cargo:warning=Could not read file {}: {}",
                    relative(root, file).display(),
                    e
                );
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("FILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES);
        eprintln!("========================================");
        for (path, lines) in &violations {
            eprintln!(
                "  {} - {} lines (exceeds by {})",
                path.display(),
                lines,
                lines - MAX_LINES
            );
        }
        eprintln!("========================================\n");
        panic!(
            "Build failed: {} file(s) exceed the {} line limit",
            violations.len(),
            MAX_LINES
        );
    }
}

fn enforce_no_dead_code_allows(root: &Path, files: &[PathBuf]) {
    let mut violations: Vec<(PathBuf, usize)> = Vec::new();

    for file in rust_sources(files) {
        if let Ok(content) = std::fs::read_to_string(file) {
            for (line_num, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                    && trimmed.contains("dead_code")
                {
                    violations.push((relative(root, file), line_num + 1));
                }
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("#[allow(dead_code)] IS NOT ALLOWED");
        eprintln!("========================================");
        for (path, line_num) in &violations {
            eprintln!("  {}:{}", path.display(), line_num);
        }
        eprintln!("\nDelete unused code, or gate test-only code with #[cfg(test)].\n");
        panic!(
            "Build failed: {} #[allow(dead_code)] occurrence(s) found. Remove the dead code.",
            violations.len()
        );
    }
}

/// Locates the name of the test function declared within a few lines of `start`.
fn test_fn_name(lines: &[&str], start: usize) -> Option<String> {
    for line in lines.iter().skip(start + 1).take(4) {
        if let Some(fn_pos) = line.find("fn ") {
            let after_fn = &line[fn_pos + 3..];
            let paren = after_fn.find('(')?;
            return Some(after_fn[..paren].trim().to_string());
        }
    }
    None
}

fn is_test_attribute(trimmed: &str) -> bool {
    trimmed == "#[test]" || trimmed.starts_with("#[tokio::test")
}

/// Bans tests that silently skip instead of failing.
fn enforce_no_test_skips(root: &Path, files: &[PathBuf]) {
    let skip_patterns = ["Skipping test", "skipping test", "Test skipped", "test skipped"];
    let mut violations: Vec<(PathBuf, String)> = Vec::new();

    for file in rust_sources(files) {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();
        let mut current_test: Option<String> = None;
        let mut brace_depth = 0i32;

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if is_test_attribute(trimmed) {
                current_test = test_fn_name(&lines, i);
                brace_depth = 0;
                continue;
            }
            let Some(name) = current_test.clone() else {
                continue;
            };

            for c in line.chars() {
                match c {
                    '{' => brace_depth += 1,
                    '}' => brace_depth -= 1,
                    _ => {}
                }
            }

            if skip_patterns.iter().any(|p| line.contains(p))
                || (trimmed == "return;" && brace_depth > 1)
            {
                violations.push((relative(root, file), name));
                current_test = None;
            } else if brace_depth == 0 && line.contains('}') {
                current_test = None;
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("SILENT TEST SKIPS ARE NOT ALLOWED");
        eprintln!("========================================");
        for (path, name) in &violations {
            eprintln!("  {} - test `{}`", path.display(), name);
        }
        eprintln!("\nTests must FAIL if they cannot run, not silently pass.\n");
        panic!(
            "Build failed: {} silent test skip(s) found. Make tests fail instead of skip.",
            violations.len()
        );
    }
}

/// Requires #[serial] for tests that mutate environment variables.
fn enforce_serial_for_env_mutations(root: &Path, files: &[PathBuf]) {
    let mut violations: Vec<(PathBuf, String)> = Vec::new();

    for file in rust_sources(files) {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();
        let mut has_serial = false;
        let mut current_test: Option<(String, bool)> = None;
        let mut brace_depth = 0i32;

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed == "#[serial]" || trimmed == "#[serial_test::serial]" {
                has_serial = true;
            }
            if is_test_attribute(trimmed) {
                current_test = test_fn_name(&lines, i).map(|name| (name, has_serial));
                brace_depth = 0;
                continue;
            }
            let Some((name, serial)) = current_test.clone() else {
                continue;
            };
            if trimmed.starts_with("#[serial") {
                current_test = Some((name.clone(), true));
            }

            for c in line.chars() {
                match c {
                    '{' => brace_depth += 1,
                    '}' => brace_depth -= 1,
                    _ => {}
                }
            }

            let mutates_env = !trimmed.starts_with("//")
                && (trimmed.contains("env::set_var") || trimmed.contains("env::remove_var"));
            let serial = serial || trimmed.starts_with("#[serial");
            if mutates_env && !serial {
                violations.push((relative(root, file), name));
                current_test = None;
                has_serial = false;
            } else if brace_depth == 0 && line.contains('}') {
                current_test = None;
                has_serial = false;
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("ENV MUTATIONS REQUIRE #[serial]");
        eprintln!("========================================");
        for (path, name) in &violations {
            eprintln!("  {} - test `{}` mutates env without #[serial]", path.display(), name);
        }
        eprintln!();
        panic!(
            "Build failed: {} test(s) mutate env vars without #[serial]",
            violations.len()
        );
    }
}
