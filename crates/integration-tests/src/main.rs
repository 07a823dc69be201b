//! Integration tests for findsku

use std::process::Output;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};
use serde_json::{json, Value};
use xshell::{cmd, Shell};

/// Get the path to the findsku binary, checking FINDSKU_PATH env var first, then falling back to "findsku"
fn get_findsku_command() -> Result<String> {
    if let Ok(path) = std::env::var("FINDSKU_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/findsku", "target/release/findsku"]
        .into_iter()
        .find(|p| Utf8Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set FINDSKU_PATH={path} to run using this binary"
        ));
    }
    Ok("findsku".to_owned())
}

/// Captured output from a command with decoded stdout/stderr strings
struct CapturedOutput {
    output: Output,
    stdout: String,
    stderr: String,
}

impl CapturedOutput {
    fn new(output: Output) -> Self {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        Self {
            output,
            stdout,
            stderr,
        }
    }

    fn exit_code(&self) -> Option<i32> {
        self.output.status.code()
    }

    fn expect_exit(&self, code: i32, context: &str) -> Result<()> {
        if self.exit_code() == Some(code) {
            return Ok(());
        }
        Err(eyre!(
            "{context}: expected exit code {code}, got {:?}\nstdout:\n{}\nstderr:\n{}",
            self.exit_code(),
            self.stdout,
            self.stderr
        ))
    }

    /// Lines after the two "-- Found" progress lines.
    fn placements(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .filter(|l| !l.starts_with("-- "))
            .collect()
    }
}

/// A scratch directory holding the two JSON documents.
struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(skus: &Value, usage: &Value) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let fixture = Self { dir };
        std::fs::write(fixture.path("skus.json"), serde_json::to_vec(skus)?)?;
        std::fs::write(fixture.path("usage.json"), serde_json::to_vec(usage)?)?;
        Ok(fixture)
    }

    fn path(&self, name: &str) -> Utf8PathBuf {
        let dir = Utf8Path::from_path(self.dir.path()).expect("utf-8 tempdir");
        dir.join(name)
    }

    /// Run findsku against the fixture files with extra arguments.
    fn run(&self, args: &[&str]) -> Result<CapturedOutput> {
        let sh = Shell::new()?;
        let bin = get_findsku_command()?;
        let skus = self.path("skus.json");
        let usage = self.path("usage.json");
        let output = cmd!(sh, "{bin} -s {skus} -u {usage} {args...}")
            .ignore_status()
            .output()?;
        Ok(CapturedOutput::new(output))
    }
}

fn d4_v3_skus() -> Value {
    json!([{
        "name": "Standard_D4_v3",
        "tier": "Standard",
        "family": "standardDv3Family",
        "resourceType": "virtualMachines",
        "capabilities": [
            {"name": "vCPUs", "value": "4"},
            {"name": "MemoryGB", "value": "16"}
        ]
    }])
}

fn usage(cores: i64, family_limit: i64) -> Value {
    json!([
        {"name": {"value": "cores", "localizedValue": "Total Regional vCPUs"}, "limit": cores, "currentValue": 0},
        {"name": {"value": "standardDv3Family", "localizedValue": "Standard DSv3 Family vCPUs"}, "limit": family_limit, "currentValue": 0}
    ])
}

fn test_single_sku_placement() -> Result<()> {
    let fixture = Fixture::new(&d4_v3_skus(), &usage(100, 32))?;
    let out = fixture.run(&["-v", "8"])?;
    out.expect_exit(0, "findsku -v 8")?;
    let expected = "Standard_D4_v3 (Standard), number of VMs: 2, vCPUs per VM: 4, memory per VM: 16.0 GB, requested vCPUs: 8";
    if out.placements() != [expected] {
        return Err(eyre!("unexpected report:\n{}", out.stdout));
    }
    if !out
        .stdout
        .starts_with("-- Found 2 SKU families with vCPU limit >= 8\n")
    {
        return Err(eyre!("missing family summary:\n{}", out.stdout));
    }
    Ok(())
}

fn test_family_quota_rejects_sku() -> Result<()> {
    let fixture = Fixture::new(&d4_v3_skus(), &usage(100, 4))?;
    let out = fixture.run(&["-v", "8"])?;
    out.expect_exit(0, "findsku -v 8 with family limit 4")?;
    if !out.placements().is_empty() {
        return Err(eyre!("expected no placements:\n{}", out.stdout));
    }
    Ok(())
}

fn test_insufficient_regional_cores() -> Result<()> {
    let fixture = Fixture::new(&d4_v3_skus(), &usage(6, 32))?;
    let out = fixture.run(&["-v", "8"])?;
    out.expect_exit(1, "findsku -v 8 with 6 regional cores")?;
    let expected = "Total vCPUs in region (6) is less than requested vCPUs (8)";
    if out.stdout.trim_end() != expected {
        return Err(eyre!("unexpected output:\n{}", out.stdout));
    }
    Ok(())
}

fn test_missing_cores_entry() -> Result<()> {
    let usage = json!([
        {"name": {"value": "standardDv3Family"}, "limit": 32, "currentValue": 0}
    ]);
    let fixture = Fixture::new(&d4_v3_skus(), &usage)?;
    let out = fixture.run(&["-v", "8"])?;
    if out.output.status.success() {
        return Err(eyre!("expected failure, got:\n{}", out.stdout));
    }
    if !out.stderr.contains("\"cores\"") {
        return Err(eyre!("error does not name the cores entry:\n{}", out.stderr));
    }
    Ok(())
}

fn test_memory_floor() -> Result<()> {
    let skus = json!([
        {"name": "Standard_F2s_v2", "tier": "Standard", "family": "standardFSv2Family",
         "capabilities": [{"name": "vCPUs", "value": "2"}, {"name": "MemoryGB", "value": "4"}]},
        {"name": "Standard_F8s_v2", "tier": "Standard", "family": "standardFSv2Family",
         "capabilities": [{"name": "vCPUs", "value": "8"}, {"name": "MemoryGB", "value": "16"}]}
    ]);
    let usage = json!([
        {"name": {"value": "cores"}, "limit": 100, "currentValue": 10},
        {"name": {"value": "standardFSv2Family"}, "limit": 64, "currentValue": 0}
    ]);
    let fixture = Fixture::new(&skus, &usage)?;
    let out = fixture.run(&["-v", "8", "-m", "8"])?;
    out.expect_exit(0, "findsku -v 8 -m 8")?;
    // F2s_v2 has only 4 GB; F8s_v2 backs 2 vCPUs at 8 GB each.
    let expected = "Standard_F8s_v2 (Standard), number of VMs: 4, vCPUs per VM: 2, memory per VM: 16.0 GB, requested vCPUs: 32";
    if out.placements() != [expected] {
        return Err(eyre!("unexpected report:\n{}", out.stdout));
    }
    Ok(())
}

fn test_malformed_json() -> Result<()> {
    let fixture = Fixture::new(&d4_v3_skus(), &usage(100, 32))?;
    std::fs::write(fixture.path("skus.json"), b"[{\"name\": \"trunc")?;
    let out = fixture.run(&["-v", "8"])?;
    if out.output.status.success() {
        return Err(eyre!("expected parse failure, got:\n{}", out.stdout));
    }
    Ok(())
}

/// Fetch both documents through a stand-in cloud CLI selected with --az.
#[cfg(unix)]
fn test_cli_fetch() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new(&d4_v3_skus(), &usage(100, 32))?;
    let script = fixture.path("az");
    let log = fixture.path("az.log");
    let skus = fixture.path("skus.json");
    let usage = fixture.path("usage.json");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$*\" >> {log}\ncase \"$2\" in\n  list-skus) cat {skus} ;;\n  list-usage) cat {usage} ;;\n  *) exit 2 ;;\nesac\n"
        ),
    )?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

    let sh = Shell::new()?;
    let bin = get_findsku_command()?;
    let output = cmd!(sh, "{bin} -v 8 -l westeurope --az {script}")
        .ignore_status()
        .output()?;
    let out = CapturedOutput::new(output);
    out.expect_exit(0, "findsku via stub az")?;
    if out.placements().len() != 1 {
        return Err(eyre!("unexpected report:\n{}", out.stdout));
    }

    let calls = std::fs::read_to_string(&log).context("reading stub az log")?;
    let calls: Vec<&str> = calls.lines().collect();
    let expected = [
        "vm list-skus --location westeurope --resource-type virtualMachines --output json",
        "vm list-usage --location westeurope --output json",
    ];
    if calls != expected {
        return Err(eyre!("unexpected az invocations: {calls:?}"));
    }
    Ok(())
}

#[cfg(not(unix))]
fn test_cli_fetch() -> Result<()> {
    Ok(())
}

fn test_cli_fetch_failure() -> Result<()> {
    let sh = Shell::new()?;
    let bin = get_findsku_command()?;
    let output = cmd!(sh, "{bin} -v 8 --az /nonexistent/az")
        .ignore_status()
        .output()?;
    let out = CapturedOutput::new(output);
    if out.output.status.success() {
        return Err(eyre!("expected failure, got:\n{}", out.stdout));
    }
    Ok(())
}

fn main() {
    // The stub CLI is a shell script
    if std::env::consts::OS != "linux" {
        eprintln!(
            "Integration tests are only supported on Linux (current OS: {})",
            std::env::consts::OS
        );
        eprintln!("Skipping all integration tests.");
        std::process::exit(0);
    }

    let args = Arguments::from_args();

    // No trial for "no qualifying families": the "cores" entry qualifies
    // whenever the regional check passes, so that exit is unreachable here.
    let tests: [(&str, fn() -> Result<()>); 9] = [
        ("single_sku_placement", test_single_sku_placement),
        ("family_quota_rejects_sku", test_family_quota_rejects_sku),
        ("insufficient_regional_cores", test_insufficient_regional_cores),
        ("missing_cores_entry", test_missing_cores_entry),
        ("memory_floor", test_memory_floor),
        ("malformed_json", test_malformed_json),
        ("cli_fetch", test_cli_fetch),
        ("cli_fetch_failure", test_cli_fetch_failure),
        ("idempotent_report", test_idempotent_report),
    ];
    let tests: Vec<Trial> = tests
        .into_iter()
        .map(|(name, f)| Trial::test(name, move || f().map_err(|e| format!("{:?}", e).into())))
        .collect();

    libtest_mimic::run(&args, tests).exit();
}

fn test_idempotent_report() -> Result<()> {
    let fixture = Fixture::new(&d4_v3_skus(), &usage(100, 32))?;
    let first = fixture.run(&["-v", "7"])?;
    let second = fixture.run(&["-v", "7"])?;
    first.expect_exit(0, "first run")?;
    if first.stdout != second.stdout {
        return Err(eyre!(
            "reports differ:\n{}\n---\n{}",
            first.stdout,
            second.stdout
        ));
    }
    Ok(())
}
