use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::tempdir;

// Minimal valid config for the simulated backend
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
# pins are unused by the simulated backend but must be present
actuator = 18
indicator = 23

[transport]
bind = "127.0.0.1:0"
idle_timeout_ms = 2000

[periodic]
tolerance_ms = 10

[stats]
report_interval_ms = 0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check passed", "stdout")]
#[case(&["serve", "--duration-ms", "50"], 0, "actuations: 0", "stdout")]
#[case(&["bogus"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("tempo_cli").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
#[case("[pins]\nactuator = 18\nindicator = 18\n", "must differ")]
#[case("[transport]\nbind = \"127.0.0.1:0\"\n", "pins")]
#[case("[pins]\nactuator = 18\nindicator = 23\n[audio]\nhigh_threshold = 100\nlow_threshold = 200\n", "high_threshold")]
fn invalid_config_exits_3(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, toml).unwrap();

    Command::cargo_bin("tempo_cli")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid configuration"))
        .stderr(predicate::str::contains(needle));
}

#[test]
fn missing_config_file_is_reported_as_json_with_json_flag() {
    let dir = tempdir().unwrap();
    let out = Command::cargo_bin("tempo_cli")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let line = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["exit_code"], 3);
}

#[test]
fn self_check_json_reports_every_step() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let out = Command::cargo_bin("tempo_cli")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["self_check"], "passed");
    let names: Vec<_> = v["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        [
            "time sync",
            "immediate actuation",
            "deferred actuation",
            "periodic series"
        ]
    );
    assert_eq!(v["stats"]["total_commands"], 2);
    assert_eq!(v["deviations"].as_array().unwrap().len(), 5);
}

fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn serve_answers_over_udp_and_exports_series_csv() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let csv = dir.path().join("series.csv");
    let port = free_udp_port();
    let addr = format!("127.0.0.1:{port}");

    let mut child = Command::cargo_bin("tempo_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("serve")
        .arg("--bind")
        .arg(&addr)
        .arg("--export-csv")
        .arg(&csv)
        .arg("--duration-ms")
        .arg("5000")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.connect(&addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();

    // The server may still be starting; retry the start command until acked.
    let start = [0x03, 2, 0, 50, 0];
    let mut buf = [0u8; 64];
    let deadline = Instant::now() + Duration::from_secs(4);
    let ack = loop {
        assert!(Instant::now() < deadline, "no PERIODIC_START ack");
        // Refused until the server binds.
        let _ = client.send(&start);
        if let Ok(n) = client.recv(&mut buf) {
            break buf[..n].to_vec();
        }
    };
    assert_eq!(ack, [1, 0]);

    for seq in 0u8..2 {
        let mut frame = vec![0x04, seq, 0];
        frame.extend_from_slice(&0u64.to_le_bytes());
        client.send(&frame).unwrap();
        std::thread::sleep(Duration::from_millis(50));
    }

    client.send(&[0x05]).unwrap();
    // Skip acks of any start frames retried while the server was starting.
    let results = loop {
        let n = client.recv(&mut buf).unwrap();
        if buf[..n] != [1, 0] {
            break buf[..n].to_vec();
        }
    };
    assert_eq!(results.len(), 6);
    assert_eq!(&results[..2], &[2, 0]);

    let status = child.wait().unwrap();
    assert!(status.success());
    let text = fs::read_to_string(&csv).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("sequence,timestamp_ms,deviation_ms,within_tolerance")
    );
    assert_eq!(lines.count(), 2);
}
