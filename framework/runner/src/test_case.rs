use std::path::{Path, PathBuf};

/// A prompt file from the test collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// File name of the prompt, used as the test case name in results
    pub name: String,
    pub path: PathBuf,
}

impl TestCase {
    pub fn read_prompt(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }
}

/// Resolve the prompt directory for a language, falling back to `prompts_dir` itself when there
/// is no subdirectory for it.
pub fn prompts_dir_for(prompts_dir: &Path, language: Option<&str>) -> PathBuf {
    match language {
        Some(language) => {
            let candidate = prompts_dir.join(language);
            if candidate.is_dir() {
                candidate
            } else {
                log::warn!(
                    "No prompts for language `{language}` in {}, using the top level prompts",
                    prompts_dir.display()
                );
                prompts_dir.to_path_buf()
            }
        }
        None => prompts_dir.to_path_buf(),
    }
}

/// Collect the `*.txt` files in `dir`, ordered by file name.
///
/// A missing directory is an empty collection.
pub fn load_test_cases(dir: &Path) -> anyhow::Result<Vec<TestCase>> {
    if !dir.exists() {
        log::warn!("Prompt directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut test_cases = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            test_cases.push(TestCase {
                name: name.to_string(),
                path: path.clone(),
            });
        }
    }

    test_cases.sort_by(|a, b| a.name.cmp(&b.name));
    log::info!("Loaded {} test case(s) from {}", test_cases.len(), dir.display());

    Ok(test_cases)
}
