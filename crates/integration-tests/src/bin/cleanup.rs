use std::process::Command;

/// Prefix of storage pools created by integration tests
const TEST_POOL_PREFIX: &str = "poolup-test-";

fn virsh(args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new("virsh")
        .args(["-c", "qemu:///session"])
        .args(args)
        .output()
}

fn cleanup_integration_test_pools() -> Result<(), Box<dyn std::error::Error>> {
    println!("Cleaning up integration test pools...");

    let list_output = virsh(&["pool-list", "--all", "--name"])?;
    if !list_output.status.success() {
        eprintln!("Warning: Failed to list storage pools");
        return Ok(());
    }

    let names = String::from_utf8_lossy(&list_output.stdout);
    let pools: Vec<&str> = names
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with(TEST_POOL_PREFIX))
        .collect();

    if pools.is_empty() {
        println!("No integration test pools found to clean up");
        return Ok(());
    }

    println!(
        "Found {} integration test pool(s) to clean up",
        pools.len()
    );

    let mut cleaned = 0;
    for pool in pools {
        print!("  Removing pool {}... ", pool);
        // Inactive pools cannot be destroyed; only the undefine result matters
        let _ = virsh(&["pool-destroy", pool])?;
        let rm_output = virsh(&["pool-undefine", pool])?;

        if rm_output.status.success() {
            println!("✓");
            cleaned += 1;
        } else {
            println!("✗ (failed)");
            eprintln!("    Error: {}", String::from_utf8_lossy(&rm_output.stderr));
        }
    }

    println!("Cleanup completed: {} pool(s) removed", cleaned);
    Ok(())
}

fn main() {
    if let Err(e) = cleanup_integration_test_pools() {
        eprintln!("Error during cleanup: {}", e);
        std::process::exit(1);
    }
}
