use std::path::Path;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};
use xshell::{cmd, Shell};

/// Prefix of every storage pool created by integration tests
pub(crate) const TEST_POOL_PREFIX: &str = "poolup-test-";

/// libvirt connection the tests run against
pub(crate) const TEST_URI: &str = "qemu:///session";

/// Undefine all storage pools left behind by integration tests
pub(crate) fn cleanup_integration_test_pools() {
    println!("Cleaning up integration test pools...");

    let Ok(sh) = Shell::new() else {
        return;
    };
    let Ok(names) = cmd!(sh, "virsh -c {TEST_URI} pool-list --all --name")
        .quiet()
        .read()
    else {
        return;
    };

    let pools: Vec<&str> = names
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with(TEST_POOL_PREFIX))
        .collect();
    if pools.is_empty() {
        println!("No integration test pools found to clean up");
        return;
    }

    println!("Found {} integration test pool(s) to clean up", pools.len());
    for pool in pools {
        let _ = cmd!(sh, "virsh -c {TEST_URI} pool-destroy {pool}")
            .quiet()
            .ignore_stderr()
            .ignore_stdout()
            .run();
        let _ = cmd!(sh, "virsh -c {TEST_URI} pool-undefine {pool}")
            .quiet()
            .ignore_stderr()
            .ignore_stdout()
            .run();
    }
    println!("Cleanup completed");
}

mod tests {
    pub mod upload;
}

/// Get the path to the poolup binary, checking POOLUP_PATH env var first, then falling back to "poolup"
pub(crate) fn get_poolup_command() -> Result<String> {
    if let Ok(path) = std::env::var("POOLUP_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/poolup", "target/release/poolup"]
        .into_iter()
        .find(|p| Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set POOLUP_PATH={path} to run using this binary"
        ));
    }
    Ok("poolup".to_owned())
}

/// Whether the binary can be run at all
fn poolup_available() -> bool {
    let Ok(poolup) = get_poolup_command() else {
        return false;
    };
    std::process::Command::new(poolup)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Whether a session libvirtd is reachable through virsh
fn libvirt_available() -> bool {
    std::process::Command::new("virsh")
        .args(["-c", TEST_URI, "pool-list", "--all", "--name"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn main() {
    let args = Arguments::from_args();

    let have_binary = poolup_available();
    let have_libvirt = have_binary && libvirt_available();
    if !have_libvirt {
        println!("libvirt session daemon or poolup binary unavailable; daemon tests ignored");
    }

    let tests = vec![
        Trial::test("upload_help", || {
            tests::upload::test_upload_help();
            Ok(())
        })
        .with_ignored_flag(!have_binary),
        Trial::test("upload_missing_source", || {
            tests::upload::test_upload_missing_source();
            Ok(())
        })
        .with_ignored_flag(!have_binary),
        Trial::test("upload_creates_pool_and_volume", || {
            tests::upload::test_upload_creates_pool_and_volume()?;
            Ok(())
        })
        .with_ignored_flag(!have_libvirt),
        Trial::test("upload_replaces_with_smaller_file", || {
            tests::upload::test_upload_replaces_with_smaller_file()?;
            Ok(())
        })
        .with_ignored_flag(!have_libvirt),
        Trial::test("upload_grows_volume", || {
            tests::upload::test_upload_grows_volume()?;
            Ok(())
        })
        .with_ignored_flag(!have_libvirt),
        Trial::test("upload_resize_policy", || {
            tests::upload::test_upload_resize_policy()?;
            Ok(())
        })
        .with_ignored_flag(!have_libvirt),
        Trial::test("upload_is_idempotent", || {
            tests::upload::test_upload_is_idempotent()?;
            Ok(())
        })
        .with_ignored_flag(!have_libvirt),
        Trial::test("upload_existing_pool_other_path", || {
            tests::upload::test_upload_existing_pool_other_path()?;
            Ok(())
        })
        .with_ignored_flag(!have_libvirt),
    ];

    // Run the tests and capture the exit code
    let exit_code = libtest_mimic::run(&args, tests);

    // Clean up any pools created by integration tests
    if have_libvirt {
        cleanup_integration_test_pools();
    }

    // Exit with the test result
    exit_code.exit();
}
