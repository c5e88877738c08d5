//! Role prompts rendered from embedded templates and on-disk guidance texts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::{FileSpec, Plan};

const MANAGER_TEMPLATE: &str = include_str!("prompts/manager.md");
const DEVELOPER_TEMPLATE: &str = include_str!("prompts/developer.md");
const TESTER_TEMPLATE: &str = include_str!("prompts/tester.md");
const FINALIZER_TEMPLATE: &str = include_str!("prompts/finalizer.md");
const DEBUGGER_TEMPLATE: &str = include_str!("prompts/debugger.md");

const PROJECT_FILE: &str = "project_description.txt";
const MANAGER_FILE: &str = "manager_bot.txt";
const DEV_PRIMARY_FILE: &str = "dev_1.txt";
const DEV_SECONDARY_FILE: &str = "dev_2.txt";
const FINAL_PRIMARY_FILE: &str = "finalizer_bot_1.txt";
const FINAL_SECONDARY_FILE: &str = "finalizer_bot_2.txt";
/// Verification guidance, with the alternate spelling some prompt sets ship.
const VERIFY_FILES: [&str; 2] = ["verification_bot.txt", "verfication_bot.txt"];

/// Guidance texts read verbatim from the prompts directory.
///
/// Missing files read as empty text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guidance {
    pub project: String,
    pub manager: String,
    pub dev_primary: String,
    pub dev_secondary: String,
    pub final_primary: String,
    pub final_secondary: String,
    pub verification: String,
}

impl Guidance {
    pub fn load(dir: &Path) -> Result<Self> {
        let mut verification = None;
        for name in VERIFY_FILES {
            if let Some(text) = read_optional(dir.join(name))? {
                verification = Some(text);
                break;
            }
        }
        let guidance = Self {
            project: read_or_empty(dir.join(PROJECT_FILE))?,
            manager: read_or_empty(dir.join(MANAGER_FILE))?,
            dev_primary: read_or_empty(dir.join(DEV_PRIMARY_FILE))?,
            dev_secondary: read_or_empty(dir.join(DEV_SECONDARY_FILE))?,
            final_primary: read_or_empty(dir.join(FINAL_PRIMARY_FILE))?,
            final_secondary: read_or_empty(dir.join(FINAL_SECONDARY_FILE))?,
            verification: verification.unwrap_or_default(),
        };
        debug!(
            dir = %dir.display(),
            project_bytes = guidance.project.len(),
            "loaded guidance"
        );
        Ok(guidance)
    }
}

/// Renders every role prompt used by the pipeline.
pub struct PromptBook {
    env: Environment<'static>,
    guidance: Guidance,
    framework: String,
}

impl PromptBook {
    pub fn new(guidance: Guidance, framework: impl Into<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("manager", MANAGER_TEMPLATE)
            .context("load manager template")?;
        env.add_template("developer", DEVELOPER_TEMPLATE)
            .context("load developer template")?;
        env.add_template("tester", TESTER_TEMPLATE)
            .context("load tester template")?;
        env.add_template("finalizer", FINALIZER_TEMPLATE)
            .context("load finalizer template")?;
        env.add_template("debugger", DEBUGGER_TEMPLATE)
            .context("load debugger template")?;
        Ok(Self {
            env,
            guidance,
            framework: framework.into(),
        })
    }

    /// Manager prompt asking for the project plan.
    pub fn manager(&self) -> Result<String> {
        let rendered = self.env.get_template("manager")?.render(context! {
            project => self.guidance.project.trim(),
            directives => self.guidance.manager.trim(),
        })?;
        Ok(rendered)
    }

    /// Developer prompt for one source file.
    pub fn developer(&self, plan: &Plan, file: &FileSpec) -> Result<String> {
        let rendered = self.env.get_template("developer")?.render(context! {
            guidance_primary => self.guidance.dev_primary.trim(),
            guidance_secondary => self.guidance.dev_secondary.trim(),
            architecture => &plan.architecture,
            path => &file.path,
            purpose => &file.purpose,
        })?;
        Ok(rendered)
    }

    /// Tester prompt for one test file.
    pub fn tester(&self, test: &FileSpec) -> Result<String> {
        let rendered = self.env.get_template("tester")?.render(context! {
            guidance => self.guidance.verification.trim(),
            framework => &self.framework,
            path => &test.path,
            purpose => &test.purpose,
        })?;
        Ok(rendered)
    }

    /// Finalizer prompt asking for README and requirements text.
    pub fn finalizer(&self, code_dir: &Path, files: &[String]) -> Result<String> {
        let rendered = self.env.get_template("finalizer")?.render(context! {
            guidance_primary => self.guidance.final_primary.trim(),
            guidance_secondary => self.guidance.final_secondary.trim(),
            code_dir => code_dir.display().to_string(),
            files => files,
        })?;
        Ok(rendered)
    }

    /// Debugger prompt embedding the recent run log.
    pub fn debugger(&self, log_tail: &[String]) -> Result<String> {
        let rendered = self.env.get_template("debugger")?.render(context! {
            log_tail => log_tail.join("\n"),
        })?;
        Ok(rendered)
    }
}

fn read_or_empty(path: PathBuf) -> Result<String> {
    Ok(read_optional(path)?.unwrap_or_default())
}

/// Read file contents if it exists, returning `None` for missing files.
fn read_optional(path: impl Into<PathBuf>) -> Result<Option<String>> {
    let path = path.into();
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("read prompt input {}", path.display()))?;
    Ok(Some(contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> PromptBook {
        let guidance = Guidance {
            project: "A todo CLI".to_string(),
            manager: "Keep it small".to_string(),
            dev_primary: "Use type hints".to_string(),
            dev_secondary: "Prefer stdlib".to_string(),
            final_primary: "Be brief".to_string(),
            final_secondary: "Pin versions".to_string(),
            verification: "Cover edge cases".to_string(),
        };
        PromptBook::new(guidance, "pytest").expect("book")
    }

    fn descriptor(path: &str, purpose: &str) -> FileSpec {
        FileSpec {
            path: path.to_string(),
            purpose: purpose.to_string(),
        }
    }

    #[test]
    fn manager_prompt_embeds_description_and_directives() {
        let prompt = book().manager().expect("render");
        assert!(prompt.starts_with("You are the MANAGER"));
        assert!(prompt.contains("A todo CLI"));
        assert!(prompt.contains("Keep it small"));
        assert!(prompt.contains(r#"{"path": "path/to/file", "purpose": "brief description"}"#));
        assert!(prompt.trim_end().ends_with("Return ONLY JSON."));
    }

    #[test]
    fn developer_prompt_embeds_both_guidance_texts_and_target() {
        let plan = Plan {
            architecture: vec!["todo.py: storage".to_string()],
            ..Plan::default()
        };
        let prompt = book()
            .developer(&plan, &descriptor("todo.py", "task storage"))
            .expect("render");
        let primary = prompt.find("Use type hints").expect("primary guidance");
        let secondary = prompt.find("Prefer stdlib").expect("secondary guidance");
        assert!(primary < secondary);
        assert!(prompt.contains("- path: todo.py"));
        assert!(prompt.contains("- purpose: task storage"));
        assert!(prompt.contains("- todo.py: storage"));
    }

    #[test]
    fn tester_prompt_names_framework_and_target() {
        let prompt = book()
            .tester(&descriptor("tests/test_todo.py", "storage tests"))
            .expect("render");
        assert!(prompt.contains("Cover edge cases"));
        assert!(prompt.contains("Write a COMPLETE pytest file"));
        assert!(prompt.contains("- path: tests/test_todo.py"));
    }

    #[test]
    fn finalizer_prompt_requests_json_object() {
        let prompt = book()
            .finalizer(Path::new("output/code"), &["todo.py".to_string()])
            .expect("render");
        assert!(prompt.contains("Given the repository at output/code"));
        assert!(prompt.contains("- todo.py"));
        assert!(prompt.contains(r#"{"readme": "...markdown...", "requirements": "...lines..."}"#));
    }

    #[test]
    fn debugger_prompt_ends_with_log_tail() {
        let tail = vec!["[ts] Running tests".to_string(), "[ts] tests| FAILED".to_string()];
        let prompt = book().debugger(&tail).expect("render");
        assert!(prompt.contains("\"before\": \"exact previous full file content\""));
        assert!(
            prompt
                .trim_end()
                .ends_with("RECENT LOG TAIL:\n[ts] Running tests\n[ts] tests| FAILED")
        );
    }

    #[test]
    fn guidance_load_tolerates_missing_files_and_alternate_spelling() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("project_description.txt"), "desc").expect("write");
        fs::write(temp.path().join("verfication_bot.txt"), "verify").expect("write");

        let guidance = Guidance::load(temp.path()).expect("load");
        assert_eq!(guidance.project, "desc");
        assert_eq!(guidance.verification, "verify");
        assert_eq!(guidance.manager, "");
        assert_eq!(guidance.dev_primary, "");
    }
}
