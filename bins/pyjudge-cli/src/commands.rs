// CLI commands: local validation and execution against the in-process store
use anyhow::{bail, Context, Result};
use pyjudge_common::types::{parse_name_list, Submission, TestCase};
use pyjudge_common::{Config, MemoryStore};
use pyjudge_engine::validator;
use pyjudge_engine::{literal, Coordinator, JudgeSettings};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn load_submission(file: &Path, allow: &str, allow_ops: Option<&str>) -> Result<Submission> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut submission = Submission::new(source, parse_name_list(allow));
    if let Some(ops) = allow_ops {
        submission = submission.with_allowed_operations(parse_name_list(ops));
    }
    Ok(submission)
}

/// `--tests` is either a path to a file holding the literal or the literal itself.
fn load_test_cases(tests: &str) -> Result<Vec<TestCase>> {
    let path = Path::new(tests);
    let text = if path.is_file() {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        tests.to_string()
    };
    literal::parse_test_cases(&text).context("INVALID TEST CASE FORMAT")
}

pub fn check(file: &Path, allow: &str, allow_ops: Option<&str>) -> Result<()> {
    let submission = load_submission(file, allow, allow_ops)?;

    match validator::validate_submission(&submission) {
        Ok(()) => {
            println!("✅ {} passed validation", file.display());
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}

pub async fn run(
    file: &Path,
    allow: &str,
    allow_ops: Option<&str>,
    tests: &str,
    timeout: Option<f64>,
) -> Result<()> {
    let config = Config::from_env()?;
    let mut settings = JudgeSettings::from(&config);
    if let Some(secs) = timeout {
        if !(secs.is_finite() && secs > 0.0) {
            bail!("--timeout must be a positive number of seconds");
        }
        settings.deadline = Duration::from_secs_f64(secs);
    }
    // Results must outlive the polling loop below.
    settings.result_ttl = settings.result_ttl.max(settings.deadline * 4);

    let submission = load_submission(file, allow, allow_ops)?;
    let test_cases = load_test_cases(tests)?;
    let total = test_cases.len();

    println!("🚀 Running {} test case(s) from {}", total, file.display());

    let coordinator = Coordinator::new(settings, Arc::new(MemoryStore::new()));
    let accepted = coordinator.submit(submission, test_cases, None).await?;

    let give_up = Instant::now() + coordinator.settings().deadline * (total as u32 + 2);
    let result = loop {
        if let Some(result) = coordinator.take_result(&accepted.job_id).await? {
            break result;
        }
        if Instant::now() > give_up {
            bail!("job {} produced no result", accepted.job_id);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("\n📊 {}/{} passed", result.passed, result.total);

    Ok(())
}

pub fn show_config() -> Result<()> {
    let config = Config::from_env()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
