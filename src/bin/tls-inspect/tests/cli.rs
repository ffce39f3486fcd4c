use std::{path::PathBuf, process::Command};

use tlsprobe::testelf::TestElf;

fn inspect(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tls-inspect"))
        .args(args)
        .output()
        .unwrap()
}

fn scratch_file(name: &str, contents: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("tls-inspect-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).unwrap();
    path
}

#[cfg(target_os = "linux")]
#[test]
fn reports_itself() {
    let me = env!("CARGO_BIN_EXE_tls-inspect");
    let out = inspect(&[me]);
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.starts_with(me));
    assert!(text.contains("PT_TLS vaddr="));
}

#[cfg(target_os = "linux")]
#[test]
fn json_report() {
    let me = env!("CARGO_BIN_EXE_tls-inspect");
    let out = inspect(&["--json", me, me]);
    assert!(out.status.success());
    let reports: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["name"], me);
    assert!(reports[0]["sections"].is_array());
    assert!(reports[0].get("machine").is_some());
}

#[test]
fn missing_file_fails() {
    let out = inspect(&["/nonexistent/tls-probe"]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn garbage_fails() {
    let path = scratch_file("garbage", b"this is not an ELF image");
    let out = inspect(&[path.to_str().unwrap()]);
    std::fs::remove_file(&path).unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("parse failed"));
}

#[test]
fn expect_tdata_without_check_is_rejected() {
    let out = inspect(&["--expect-tdata", "0xdeadbeef", "a.out"]);
    assert!(!out.status.success());
}

fn stderr(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn check_passes_on_complete_image() {
    let path = scratch_file("complete", &TestElf::default().build());
    let out = inspect(&["--check", path.to_str().unwrap()]);
    std::fs::remove_file(&path).unwrap();
    assert!(out.status.success(), "{}", stderr(&out));
}

#[test]
fn check_fails_on_missing_tbss() {
    let elf = TestElf {
        tbss: false,
        ..Default::default()
    };
    let path = scratch_file("no-tbss", &elf.build());
    let out = inspect(&["--check", path.to_str().unwrap()]);
    std::fs::remove_file(&path).unwrap();
    assert!(!out.status.success());
    assert!(stderr(&out).contains(".tbss"));
}

#[test]
fn require_pie() {
    let plain = scratch_file("plain", &TestElf::default().build());
    let pie = scratch_file(
        "pie",
        &TestElf {
            pie: true,
            ..Default::default()
        }
        .build(),
    );

    let out = inspect(&["--check", "--require-pie", plain.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("not a position independent executable"));

    let out = inspect(&["--check", "--require-pie", pie.to_str().unwrap()]);
    assert!(out.status.success(), "{}", stderr(&out));

    std::fs::remove_file(&plain).unwrap();
    std::fs::remove_file(&pie).unwrap();
}

#[test]
fn expect_tdata_mismatch() {
    let path = scratch_file("tdata", &TestElf::default().build());
    let out = inspect(&["--check", "--expect-tdata", "0x12345678", path.to_str().unwrap()]);
    std::fs::remove_file(&path).unwrap();
    assert!(!out.status.success());
    assert!(stderr(&out).contains("does not contain 0x12345678"));
}

#[cfg(target_os = "linux")]
#[test]
fn expect_tdata_mismatch_on_itself() {
    let me = env!("CARGO_BIN_EXE_tls-inspect");
    let out = inspect(&["--check", "--expect-tdata", "0x12345678", me]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("does not contain 0x12345678"));
}
