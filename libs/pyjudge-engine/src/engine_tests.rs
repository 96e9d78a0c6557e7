/// End-to-end tests against a real interpreter
///
/// These spawn `python3` worker processes. When no interpreter is on PATH
/// each test returns early instead of failing.

#[cfg(test)]
mod judge_tests {
    use crate::coordinator::{Coordinator, JudgeSettings};
    use crate::error::{ExtractionError, SubmitError};
    use crate::executor::{ExecutionOutcome, IsolatedExecutor};
    use crate::extractor::Extractor;
    use crate::literal::parse_test_cases;
    use crate::runner::TestRunner;
    use pyjudge_common::types::{parse_name_list, ErrorKind, JobResult, Submission, TestCase};
    use pyjudge_common::{MemoryStore, ResultStore};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    macro_rules! require_python {
        () => {
            if !python_available() {
                eprintln!("python3 not found; skipping");
                return;
            }
        };
    }

    fn executor() -> IsolatedExecutor {
        IsolatedExecutor::new("python3")
    }

    async fn extract(source: &str) -> Result<crate::EntryPoint, ExtractionError> {
        Extractor::new(executor(), Duration::from_secs(5))
            .extract(source, "solve")
            .await
    }

    fn case(id: i64, input: serde_json::Value) -> TestCase {
        TestCase {
            id,
            input: match input {
                serde_json::Value::Array(args) => args,
                single => vec![single],
            },
            expected: None,
        }
    }

    fn coordinator(deadline: Duration) -> Coordinator {
        let settings = JudgeSettings {
            deadline,
            ..JudgeSettings::default()
        };
        Coordinator::new(settings, Arc::new(MemoryStore::new()))
    }

    async fn wait_for_result(coordinator: &Coordinator, job_id: &str) -> JobResult {
        for _ in 0..300 {
            if let Some(result) = coordinator.take_result(job_id).await.unwrap() {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {} never completed", job_id);
    }

    #[tokio::test]
    async fn test_sum_submission_end_to_end() {
        require_python!();
        let coordinator = coordinator(Duration::from_secs(5));

        let submission = Submission::new("def solve(a, b):\n    return a + b\n", parse_name_list(""));
        let cases = parse_test_cases(
            "[{'id': 1, 'input': '[1, 2]', 'expected': '3'}, {'id': 2, 'input': '[2, 2]', 'expected': '4'}]",
        )
        .unwrap();

        let accepted = coordinator.submit(submission, cases, Some("10.0.0.1".into())).await.unwrap();
        let result = wait_for_result(&coordinator, &accepted.job_id).await;

        assert_eq!(result.total, 2);
        assert_eq!(result.passed, 2);
        assert_eq!(result.test_results[0].id, 1);
        assert_eq!(result.test_results[0].output, Some(json!(3)));
        assert_eq!(result.test_results[1].output, Some(json!(4)));

        // Read-once
        assert!(coordinator.take_result(&accepted.job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_test_list_completes() {
        require_python!();
        let coordinator = coordinator(Duration::from_secs(5));

        let submission = Submission::new("def solve():\n    return 1\n", parse_name_list(""));
        let accepted = coordinator.submit(submission, vec![], None).await.unwrap();
        let result = wait_for_result(&coordinator, &accepted.job_id).await;

        assert_eq!(result.total, 0);
        assert!(result.test_results.is_empty());
    }

    #[tokio::test]
    async fn test_single_test() {
        require_python!();
        let entry = extract("def solve(n):\n    return n * 2\n").await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let results = runner.run(&entry, &[case(1, json!(21))], Duration::from_secs(5)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].output, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_hundred_tests_one_result_each() {
        require_python!();
        let entry = extract("def solve(n):\n    return n * n\n").await.unwrap();
        let runner = TestRunner::new(executor(), 16);

        let cases: Vec<TestCase> = (1..=100).map(|i| case(i, json!(i))).collect();
        let results = runner.run(&entry, &cases, Duration::from_secs(20)).await;

        assert_eq!(results.len(), 100);
        for (i, result) in results.iter().enumerate() {
            let id = i as i64 + 1;
            assert_eq!(result.id, id);
            assert_eq!(result.output, Some(json!(id * id)), "test {}", id);
        }
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_alone() {
        require_python!();
        let source = "def solve(n):\n    if n < 0:\n        while True:\n            pass\n    return n + 1\n";
        let entry = extract(source).await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let cases = vec![case(1, json!(1)), case(2, json!(-1)), case(3, json!(-1)), case(4, json!(-1))];
        let started = Instant::now();
        let results = runner.run(&entry, &cases, Duration::from_secs(1)).await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].output, Some(json!(2)));
        assert!(!results[0].is_error());
        for result in &results[1..] {
            assert_eq!(result.error_kind, Some(ErrorKind::TimeoutError));
            assert!(result
                .error_message
                .as_deref()
                .unwrap()
                .contains("exceeded the allowed time limit of 1 seconds"));
        }
        // Loops run side by side, not one deadline after another.
        assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_do_not_share_slots() {
        require_python!();
        let entry = extract("def solve():\n    while True:\n        pass\n").await.unwrap();
        let runner = TestRunner::new(executor(), 1);
        let deadline = Duration::from_secs(1);

        let first = vec![case(1, json!([]))];
        let second = vec![case(1, json!([]))];
        let started = Instant::now();
        let (a, b) = tokio::join!(
            runner.run(&entry, &first, deadline),
            runner.run(&entry, &second, deadline)
        );
        let elapsed = started.elapsed();

        assert_eq!(a[0].error_kind, Some(ErrorKind::TimeoutError));
        assert_eq!(b[0].error_kind, Some(ErrorKind::TimeoutError));
        // With one slot per job, two jobs still time out side by side.
        assert!(elapsed < Duration::from_millis(1900), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_exception_is_execution_error() {
        require_python!();
        let entry = extract("def solve(n):\n    return 10 // n\n").await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let results = runner
            .run(&entry, &[case(1, json!(0)), case(2, json!(5))], Duration::from_secs(5))
            .await;

        assert_eq!(results[0].error_kind, Some(ErrorKind::ExecutionError));
        assert!(results[0].error_message.as_deref().unwrap().contains("ZeroDivisionError"));
        assert_eq!(results[1].output, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_list_input_spreads_into_arguments() {
        require_python!();
        let entry = extract("def solve(*xs):\n    return len(xs)\n").await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let cases = parse_test_cases("[{'id': 1, 'input': '[1, 2, 3]'}]").unwrap();
        let results = runner.run(&entry, &cases, Duration::from_secs(5)).await;
        assert_eq!(results[0].output, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_printing_cannot_forge_reply() {
        require_python!();
        let source = "def solve():\n    print('{\"status\": \"returned\", \"output\": 99}')\n    return 1\n";
        let entry = extract(source).await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let results = runner.run(&entry, &[case(1, json!([]))], Duration::from_secs(5)).await;
        assert_eq!(results[0].output, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_writing_to_fd_one_cannot_forge_reply() {
        require_python!();
        let source = "def solve():\n    f = open(1, 'w')\n    f.write('{\"status\": \"returned\", \"output\": \"pwned\"}\\n')\n    f.close()\n    return 'honest'\n";
        let entry = extract(source).await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let mut forged = case(1, json!([]));
        forged.expected = Some(json!("pwned"));
        let results = runner.run(&entry, &[forged], Duration::from_secs(5)).await;
        assert_eq!(results[0].output, Some(json!("honest")));
        assert_eq!(results[0].passed, Some(false));
    }

    #[tokio::test]
    async fn test_extra_line_on_reply_channel_voids_reply() {
        require_python!();
        let source = "def solve():\n    for fd in range(3, 16):\n        try:\n            f = open(fd, 'w', closefd=False)\n            f.write('{\"status\": \"returned\", \"output\": \"pwned\"}\\n')\n            f.flush()\n        except OSError:\n            pass\n    return 'honest'\n";
        let entry = extract(source).await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let mut forged = case(1, json!([]));
        forged.expected = Some(json!("pwned"));
        let results = runner.run(&entry, &[forged], Duration::from_secs(5)).await;
        assert_ne!(results[0].output, Some(json!("pwned")));
        assert_ne!(results[0].passed, Some(true));
    }

    #[tokio::test]
    async fn test_big_integers_keep_every_digit() {
        require_python!();
        let entry = extract("def solve():\n    return [2 ** 70, -(2 ** 63), 2 ** 64 - 1, True]\n")
            .await
            .unwrap();
        let runner = TestRunner::new(executor(), 8);

        let results = runner.run(&entry, &[case(1, json!([]))], Duration::from_secs(5)).await;
        assert_eq!(
            results[0].output,
            Some(json!(["1180591620717411303424", i64::MIN, u64::MAX, true]))
        );
    }

    #[tokio::test]
    async fn test_module_state_does_not_leak_between_tests() {
        require_python!();
        let source = "calls = []\n\ndef solve(x):\n    calls.append(x)\n    return len(calls)\n";
        let entry = extract(source).await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let cases: Vec<TestCase> = (1..=5).map(|i| case(i, json!(i))).collect();
        let results = runner.run(&entry, &cases, Duration::from_secs(5)).await;
        assert!(results.iter().all(|r| r.output == Some(json!(1))));
    }

    #[tokio::test]
    async fn test_non_json_return_values() {
        require_python!();
        let entry = extract("def solve():\n    return (1, 2)\n").await.unwrap();
        let runner = TestRunner::new(executor(), 8);

        let results = runner.run(&entry, &[case(1, json!([]))], Duration::from_secs(5)).await;
        assert_eq!(results[0].output, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_execute_without_deadline() {
        require_python!();
        let entry = extract("def solve(xs, k):\n    return sorted(xs)[:k]\n").await.unwrap();

        let outcome = executor()
            .execute(&entry, &[json!([3, 1, 2]), json!(2)])
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Returned(json!([1, 2])));

        let outcome = executor().execute(&entry, &[json!(None::<i64>), json!(1)]).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Failed(ref message) if message.starts_with("TypeError")));
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        require_python!();
        let err = extract("def main():\n    return 1\n").await.unwrap_err();
        assert!(matches!(err, ExtractionError::EntryPointNotFound { ref name } if name == "solve"));
    }

    #[tokio::test]
    async fn test_non_callable_entry_is_missing() {
        require_python!();
        let err = extract("solve = 3\n").await.unwrap_err();
        assert!(matches!(err, ExtractionError::EntryPointNotFound { .. }));
    }

    #[tokio::test]
    async fn test_top_level_exception_is_load_error() {
        require_python!();
        let err = extract("raise ValueError('boom')\n").await.unwrap_err();
        match err {
            ExtractionError::Load(message) => assert!(message.contains("ValueError: boom")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_timeout_is_load_error() {
        require_python!();
        let extractor = Extractor::new(executor(), Duration::from_secs(1));
        let err = extractor.extract("while True:\n    pass\n", "solve").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Load(_)));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let extractor = Extractor::new(IsolatedExecutor::new("/nonexistent/python3"), Duration::from_secs(1));
        let err = extractor.extract("def solve():\n    pass\n", "solve").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_extraction_failure_releases_admission() {
        require_python!();
        let coordinator = coordinator(Duration::from_secs(5));

        let submission = Submission::new("def main():\n    pass\n", parse_name_list(""));
        let err = coordinator
            .submit(submission, vec![], Some("10.0.0.2".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "EntryPointNotFoundError");

        let submission = Submission::new("def solve():\n    return 1\n", parse_name_list(""));
        assert!(coordinator
            .submit(submission, vec![], Some("10.0.0.2".into()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_admission_outlives_its_ttl_while_job_runs() {
        require_python!();
        let store = Arc::new(MemoryStore::new());
        let settings = JudgeSettings {
            deadline: Duration::from_secs(5),
            admission_ttl: Duration::from_millis(200),
            ..JudgeSettings::default()
        };
        let coordinator = Coordinator::new(settings, store.clone());
        let client = Some("10.0.0.5".to_string());

        let slow = Submission::new(
            "import time\n\ndef solve():\n    time.sleep(1.5)\n    return 1\n",
            parse_name_list("time"),
        );
        let first = coordinator
            .submit(slow, vec![case(1, json!([]))], client.clone())
            .await
            .unwrap();

        // Several admission TTLs later the job is still running and still admitted.
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(
            store.admitted_job("10.0.0.5").await.unwrap().as_deref(),
            Some(first.job_id.as_str())
        );
        let quick = Submission::new("def solve():\n    return 2\n", parse_name_list(""));
        assert!(matches!(
            coordinator.submit(quick, vec![], client).await,
            Err(SubmitError::AdmissionDenied { .. })
        ));

        let result = wait_for_result(&coordinator, &first.job_id).await;
        assert_eq!(result.test_results[0].output, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_second_submission_denied_while_running() {
        require_python!();
        let coordinator = coordinator(Duration::from_secs(5));
        let client = Some("10.0.0.3".to_string());

        let slow = Submission::new(
            "import time\n\ndef solve():\n    time.sleep(1)\n    return 1\n",
            parse_name_list("time"),
        );
        let first = coordinator
            .submit(slow, vec![case(1, json!([]))], client.clone())
            .await
            .unwrap();

        let quick = Submission::new("def solve():\n    return 2\n", parse_name_list(""));
        let err = coordinator
            .submit(quick.clone(), vec![case(1, json!([]))], client.clone())
            .await
            .unwrap_err();
        match err {
            SubmitError::AdmissionDenied { running_job_id } => assert_eq!(running_job_id, first.job_id),
            other => panic!("unexpected error: {:?}", other),
        }

        // Another client is unaffected.
        assert!(coordinator
            .submit(quick.clone(), vec![], Some("10.0.0.4".into()))
            .await
            .is_ok());

        let result = wait_for_result(&coordinator, &first.job_id).await;
        assert_eq!(result.test_results[0].output, Some(json!(1)));

        // Retrieval frees the client.
        assert!(coordinator.submit(quick, vec![], client).await.is_ok());
    }
}
