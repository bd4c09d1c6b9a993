#![cfg(not(target_arch = "wasm32"))]

use std::fs;
use std::path::{Path, PathBuf};

use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

const PTE_P: u32 = 1 << 0;
const PTE_RW: u32 = 1 << 1;
const PTE_US: u32 = 1 << 2;

fn put_u32(image: &mut [u8], paddr: usize, value: u32) {
    image[paddr..paddr + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(image: &mut [u8], paddr: usize, value: u64) {
    image[paddr..paddr + 8].copy_from_slice(&value.to_le_bytes());
}

/// Legacy tables: PD at 0x1000, PDE[0] -> PT at 0x2000, PTE[1] -> user page at 0x5000.
fn legacy_image(dir: &TempDir) -> PathBuf {
    let mut image = vec![0u8; 0x3000];
    put_u32(&mut image, 0x1000, 0x2000 | PTE_P | PTE_RW | PTE_US);
    put_u32(&mut image, 0x2004, 0x5000 | PTE_P | PTE_US);

    let path = dir.path().join("legacy.raw");
    fs::write(&path, image).unwrap();
    path
}

fn cmd(image: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("v2p-translate");
    cmd.arg(image);
    cmd
}

#[test]
fn translates_legacy_address() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    cmd(&image)
        .args(["0x1234", "--cr3", "0x1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0x00001234 -> 0x5234"));
}

#[test]
fn decimal_addresses_are_accepted() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    cmd(&image)
        .args(["4660", "--cr3", "4096"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> 0x5234"));
}

#[test]
fn any_failure_sets_exit_status() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    // 0x1234 maps, 0x3000 hits a not-present PTE.
    cmd(&image)
        .args(["0x1234", "0x3000", "--cr3", "0x1000"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("0x00001234 -> 0x5234"))
        .stdout(predicate::str::contains("0x00003000: page fault"))
        .stdout(predicate::str::contains("status=-1"));
}

#[test]
fn user_context_and_write_access_are_checked() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    cmd(&image)
        .args(["0x1234", "--cr3", "0x1000", "--user"])
        .assert()
        .success();

    cmd(&image)
        .args(["0x1234", "--cr3", "0x1000", "--user", "--access", "write"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("detail=0x0"));
}

#[test]
fn json_reports_one_object_per_address() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    let out = cmd(&image)
        .args(["0x1234", "0x0fff_0000", "--cr3", "0x1000", "--json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let lines: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["virtual_address"], 0x1234);
    assert_eq!(lines[0]["physical_address"], 0x5234);
    assert_eq!(lines[0]["status"], 0);
    assert!(lines[0]["error"].is_null());

    // PDE[0x3f] lies inside the image but is zero.
    assert_eq!(lines[1]["status"], -1);
    assert_eq!(lines[1]["fault_detail"], 0);
    assert_eq!(lines[1]["physical_address"], 0);
}

#[test]
fn pae_large_page_from_register_values() {
    let dir = tempdir().unwrap();
    let mut image = vec![0u8; 0x2000];
    put_u64(&mut image, 0, 0x1000 | u64::from(PTE_P));
    put_u64(&mut image, 0x1000, 0x0040_0000 | u64::from(PTE_P) | (1 << 7));
    let path = dir.path().join("pae.raw");
    fs::write(&path, image).unwrap();

    // CR0.PG | CR4.PAE
    cmd(&path)
        .args(["0x0001_2345", "--cr0", "0x80000000", "--cr4", "0x20", "--pat"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> 0x412345"));
}

#[test]
fn reserved_bit_detail_is_reported() {
    let dir = tempdir().unwrap();
    let mut image = vec![0u8; 0x2000];
    // 4MB page with bit 12 set and no PAT support.
    put_u32(&mut image, 0x1000, 0x0040_0000 | 0x1000 | PTE_P | (1 << 7));
    let path = dir.path().join("rsvd.raw");
    fs::write(&path, image).unwrap();

    cmd(&path)
        .args(["0x10", "--cr3", "0x1000", "--pse"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("detail=0x8"));
}

#[test]
fn long_mode_registers_are_rejected_per_address() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    cmd(&image)
        .args(["0x1234", "--cr0", "0x80000000", "--cr4", "0x20", "--efer", "0x100"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("status=-3"));
}

#[test]
fn missing_image_is_an_error() {
    let dir = tempdir().unwrap();

    cmd(&dir.path().join("nope.raw"))
        .arg("0x1000")
        .assert()
        .failure()
        .stderr(predicate::str::contains("open image"));
}

#[test]
fn out_of_range_max_phys_bits_is_rejected() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    cmd(&image)
        .args(["0x1000", "--max-phys-bits", "60"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max-phys-bits"));
}

#[test]
fn pse_reserves_table_pointer_bits() {
    let dir = tempdir().unwrap();
    // PDE[0] points at a page table at 0x2000, so bit 13 is set.
    let image = legacy_image(&dir);

    cmd(&image)
        .args(["0x1234", "--cr3", "0x1000", "--pse"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("detail=0x8"));

    cmd(&image)
        .args(["0x1234", "--cr3", "0x1000", "--pse", "--large-pde-reserved-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0x00001234 -> 0x5234"));
}

#[test]
fn root_above_4gb_is_rejected() {
    let dir = tempdir().unwrap();
    let image = legacy_image(&dir);

    cmd(&image)
        .args(["0x1234", "--cr3", "0x1_0000_1000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not fit in 32 bits"));
}
