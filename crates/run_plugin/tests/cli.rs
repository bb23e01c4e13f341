#[cfg(unix)]
mod unix {
    use std::{
        fs,
        io::{BufRead, BufReader},
        os::unix::fs::PermissionsExt,
        process::{Command, Output, Stdio},
        time::Duration,
    };

    use tempfile::TempDir;

    const PLUGIN_SH: &str = r#"#!/bin/sh
# plugin.sh --quiet -- <plugin> <engine-vars> <images> <config>
plugin="$3"
echo "running $plugin with $4" >&2
case "$plugin" in
  good)
    echo '{"success": true, "truncated": false, "details": [], "errors": []}'
    ;;
  truncated)
    echo '{"success": true, "truncated": true, "details": [], "errors": []}'
    ;;
  failing)
    echo '{"success": false, "truncated": false, "details": [], "errors": ["boom"]}'
    exit 1
    ;;
  counted)
    echo '{"success": true, "truncated": false, "details": {"count": "many"}, "errors": []}'
    ;;
  hang)
    echo ready
    exec sleep 30
    ;;
esac
"#;

    struct Fixture {
        plugins: TempDir,
        args: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let plugins = TempDir::new().expect("plugin root");
            let script = plugins.path().join("plugin.sh");
            fs::write(&script, PLUGIN_SH).expect("write plugin.sh");
            let mut perms = fs::metadata(&script).expect("metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&script, perms).expect("chmod");

            let args = TempDir::new().expect("arg root");
            fs::write(args.path().join("engine-vars.json"), r#"{"repo":"demo"}"#).unwrap();
            fs::write(args.path().join("images.json"), "{}").unwrap();
            fs::write(args.path().join("config.json"), "{}").unwrap();

            Self { plugins, args }
        }

        fn command(&self, plugin: &str) -> Command {
            let mut cmd = Command::new(env!("CARGO_BIN_EXE_run-plugin"));
            cmd.arg(plugin)
                .arg("boxed")
                .arg("--plugin-root")
                .arg(self.plugins.path())
                .arg("--arg-root")
                .arg(self.args.path())
                .arg("--no-color")
                .env_remove("RUST_LOG");
            cmd
        }

        fn run(&self, plugin: &str, extra: &[&str]) -> Output {
            self.command(plugin)
                .args(extra)
                .output()
                .expect("run-plugin should start")
        }
    }

    fn stdout(out: &Output) -> String {
        String::from_utf8_lossy(&out.stdout).into_owned()
    }

    fn stderr(out: &Output) -> String {
        String::from_utf8_lossy(&out.stderr).into_owned()
    }

    #[test]
    fn valid_report_passes() {
        let fixture = Fixture::new();
        let out = fixture.run("good", &[]);

        assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
        let text = stdout(&out);
        assert!(text.contains("running good with {\"repo\":\"demo\"}"), "{text}");
        assert!(text.contains("\"truncated\": false"), "{text}");
        assert!(text.ends_with("==> Plugin exited with status: 0 (success)\n"), "{text}");
        assert!(!text.contains("--> Error:"), "{text}");
    }

    #[test]
    fn findings_are_reported_but_do_not_fail_by_default() {
        let fixture = Fixture::new();
        let out = fixture.run("truncated", &[]);

        assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
        assert!(stdout(&out).contains("--> Error: at '/truncated': value must be false"));

        let strict = fixture.run("truncated", &["--strict"]);
        assert_eq!(strict.status.code(), Some(3));
    }

    #[test]
    fn plugin_failure_is_labelled_and_fails_strict_runs() {
        let fixture = Fixture::new();
        let out = fixture.run("failing", &[]);

        assert_eq!(out.status.code(), Some(0));
        assert!(stdout(&out).contains("==> Plugin exited with status: 1 (failed)"));

        let strict = fixture.run("failing", &["--strict"]);
        assert_eq!(strict.status.code(), Some(3));
    }

    #[test]
    fn details_schema_applies_to_selected_plugin_type() {
        let fixture = Fixture::new();
        let schema = fixture.args.path().join("details.json");
        fs::write(
            &schema,
            r#"{"type": "object", "properties": {"count": {"type": "integer"}}}"#,
        )
        .unwrap();

        let out = fixture.run(
            "counted",
            &[
                "--plugin-type",
                "vulnerability",
                "--details-schema",
                schema.to_str().unwrap(),
            ],
        );
        assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
        assert!(
            stdout(&out).contains("--> Error: at '/details/count': got string, want integer"),
            "{}",
            stdout(&out)
        );
    }

    #[test]
    fn missing_arg_file_fails_before_spawning() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.args.path().join("images.json")).unwrap();

        let out = fixture.run("good", &[]);
        assert_eq!(out.status.code(), Some(1));
        assert!(stderr(&out).contains("unable to read arg file"), "{}", stderr(&out));
        assert!(!stdout(&out).contains("running good"));
    }

    #[test]
    fn unknown_runner_is_a_usage_error() {
        let out = Command::new(env!("CARGO_BIN_EXE_run-plugin"))
            .args(["good", "docker"])
            .output()
            .expect("run-plugin should start");
        assert_eq!(out.status.code(), Some(2));
        assert!(stderr(&out).contains("unsupported plugin runner"));
    }

    #[test]
    fn interrupt_aborts_the_run() {
        let fixture = Fixture::new();
        let mut child = fixture
            .command("hang")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn run-plugin");

        let stdout = child.stdout.take().expect("stdout");
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next() {
                Some(Ok(line)) if line == "ready" => break,
                Some(Ok(_)) => continue,
                other => panic!("plugin never became ready: {other:?}"),
            }
        }

        let status = Command::new("kill")
            .arg("-INT")
            .arg(child.id().to_string())
            .status()
            .expect("send SIGINT");
        assert!(status.success());

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let status = loop {
            if let Some(status) = child.try_wait().expect("try_wait") {
                break status;
            }
            assert!(std::time::Instant::now() < deadline, "run-plugin ignored SIGINT");
            std::thread::sleep(Duration::from_millis(50));
        };
        assert_eq!(status.code(), Some(130));

        let remaining: Vec<_> = lines.map_while(Result::ok).collect();
        assert!(
            !remaining.iter().any(|l| l.starts_with("==> Plugin exited")),
            "{remaining:?}"
        );
    }

    #[test]
    fn plugin_root_can_come_from_the_environment() {
        let fixture = Fixture::new();
        let out = Command::new(env!("CARGO_BIN_EXE_run-plugin"))
            .args(["good", "boxed", "--no-color"])
            .env("PLUGIN_RUNNER_PLUGIN_ROOT", fixture.plugins.path())
            .env("PLUGIN_RUNNER_ARG_ROOT", fixture.args.path())
            .output()
            .expect("run-plugin should start");
        assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
        assert!(stdout(&out).contains("(success)"));
    }
}
