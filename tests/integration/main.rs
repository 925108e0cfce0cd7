//! Integration tests for Depot

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// Fake installer: records each run, then lays down left-pad
    const LEFT_PAD_INSTALLER: &str = r#"
[installer]
command = "sh"
args = ["-c", '''
echo run >> "$DEPOT_TEST_COUNT"
sleep 0.3
mkdir -p node_modules/left-pad
echo '{"name": "left-pad", "version": "1.3.0"}' > node_modules/left-pad/package.json
echo 'module.exports = {};' > node_modules/left-pad/index.js
''']
"#;

    const FAILING_INSTALLER: &str = r#"
[installer]
command = "sh"
args = ["-c", "echo 'npm ERR! 404 Not Found' >&2; exit 1"]
"#;

    const FAST_TIMING: &str = r#"
[cache]
heartbeat_interval_ms = 50
stale_tolerance_ms = 200
max_creation_delay_ms = 200
"#;

    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new(installer: &str) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(
                dir.path().join("config.toml"),
                format!("{installer}\n{FAST_TIMING}"),
            )
            .unwrap();
            Self { dir }
        }

        fn cache_dir(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn count_file(&self) -> PathBuf {
            self.dir.path().join("installs")
        }

        fn installs(&self) -> usize {
            std::fs::read_to_string(self.count_file())
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        fn depot(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("depot");
            self.configure(&mut cmd);
            cmd
        }

        fn configure<C: Envs>(&self, cmd: &mut C) {
            cmd.set("DEPOT_CONFIG", &self.dir.path().join("config.toml"));
            cmd.set("DEPOT_CACHE_DIR", &self.cache_dir());
            cmd.set("DEPOT_TEST_COUNT", &self.count_file());
        }
    }

    trait Envs {
        fn set(&mut self, key: &str, value: &Path);
    }

    impl Envs for Command {
        fn set(&mut self, key: &str, value: &Path) {
            self.env(key, value);
        }
    }

    impl Envs for std::process::Command {
        fn set(&mut self, key: &str, value: &Path) {
            self.env(key, value);
        }
    }

    fn ready_bundles(cache_dir: &Path) -> usize {
        std::fs::read_dir(cache_dir.join("bundles"))
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().join("index.json").exists())
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("depot")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("shared package bundle cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("depot")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("depot"));
    }

    #[test]
    fn preload_is_hidden() {
        cargo_bin_cmd!("depot")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("preload").not());
    }

    #[test]
    fn list_empty() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);
        sandbox
            .depot()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No bundles found"));
    }

    #[test]
    fn config_path() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);
        sandbox
            .depot()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);
        sandbox
            .depot()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("heartbeat_interval_ms = 50"));
    }

    #[test]
    fn invalid_config_reports_path() {
        let sandbox = Sandbox::new("[cache]\nheartbeat_interval_ms = \"soon\"");
        sandbox
            .depot()
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn warm_then_get_uses_cached_bundle() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);

        sandbox
            .depot()
            .args(["warm", "left-pad"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ready (installed)"));

        sandbox
            .depot()
            .args(["get", "left-pad", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("index.js"));

        sandbox
            .depot()
            .args(["warm", "left-pad"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already cached"));

        assert_eq!(sandbox.installs(), 1);
    }

    #[test]
    fn get_json_output() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);
        sandbox
            .depot()
            .args(["get", "left-pad", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""version": "1.3.0""#))
            .stdout(predicate::str::contains(r#""kind": "commonjs""#));
    }

    #[test]
    fn pins_print_installed_versions() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);
        sandbox
            .depot()
            .args(["pins", "left-pad"])
            .assert()
            .success()
            .stdout(predicate::str::contains("left-pad@1.3.0"));
    }

    #[test]
    fn list_and_clear() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);
        sandbox.depot().args(["warm", "left-pad"]).assert().success();

        sandbox
            .depot()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("ready"))
            .stdout(predicate::str::contains("left-pad@*"));

        sandbox
            .depot()
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared 1 bundle(s)"));

        assert_eq!(ready_bundles(&sandbox.cache_dir()), 0);
    }

    #[test]
    fn clear_aborts_without_confirmation() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);
        sandbox.depot().args(["warm", "left-pad"]).assert().success();

        sandbox
            .depot()
            .arg("clear")
            .write_stdin("n\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted"));

        assert_eq!(ready_bundles(&sandbox.cache_dir()), 1);
    }

    #[test]
    fn failed_install_names_package() {
        let sandbox = Sandbox::new(FAILING_INSTALLER);
        sandbox
            .depot()
            .args(["get", "no-such-pkg"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no-such-pkg"))
            .stderr(predicate::str::contains("Hint:"));

        let log = std::fs::read_to_string(sandbox.cache_dir().join("errors.log")).unwrap();
        assert!(log.contains("404 Not Found"));
        assert_eq!(ready_bundles(&sandbox.cache_dir()), 0);
    }

    #[test]
    fn concurrent_processes_install_once() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);

        let children: Vec<_> = (0..4)
            .map(|_| {
                let mut cmd = std::process::Command::new(env!("CARGO_BIN_EXE_depot"));
                sandbox.configure(&mut cmd);
                cmd.args(["warm", "left-pad"])
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .spawn()
                    .unwrap()
            })
            .collect();

        for mut child in children {
            assert!(child.wait().unwrap().success());
        }

        assert_eq!(sandbox.installs(), 1);
        assert_eq!(ready_bundles(&sandbox.cache_dir()), 1);
    }

    #[test]
    fn detached_warm_returns_and_installs_in_background() {
        let sandbox = Sandbox::new(LEFT_PAD_INSTALLER);

        sandbox
            .depot()
            .args(["warm", "--detach", "left-pad"])
            .assert()
            .success()
            .stdout(predicate::str::contains("in the background"));

        let deadline = Instant::now() + Duration::from_secs(10);
        while ready_bundles(&sandbox.cache_dir()) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }

        assert_eq!(ready_bundles(&sandbox.cache_dir()), 1);
        assert_eq!(sandbox.installs(), 1);
    }
}
