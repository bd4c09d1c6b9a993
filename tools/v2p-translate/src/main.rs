use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use v2p_mmu::{
    translate, AccessKind, ControlRegisters, PagingMode, TranslationConfig, TranslationOutcome,
    MAX_PHYS_BITS,
};

#[derive(Parser, Debug)]
#[command(
    name = "v2p-translate",
    about = "Translate x86 virtual addresses through the page tables in a raw physical memory image."
)]
struct Args {
    /// Raw physical memory image (byte 0 is physical address 0)
    image: PathBuf,

    /// Virtual addresses to translate (decimal or 0x-prefixed hex)
    #[arg(required = true, value_name = "VADDR", value_parser = parse_u32)]
    vaddrs: Vec<u32>,

    /// Paging mode
    #[arg(long, value_enum, default_value_t = Mode::Legacy)]
    mode: Mode,

    /// Page table root (CR3, 32 bits)
    #[arg(long, value_name = "ADDR", value_parser = parse_u32, default_value = "0")]
    cr3: u32,

    /// CR4.PSE: allow 4MB pages in legacy mode
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pse: bool,

    /// The CPU supports PSE-36
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pse36: bool,

    /// The CPU supports PAT
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pat: bool,

    /// EFER.NXE
    #[arg(long, action = clap::ArgAction::SetTrue)]
    nxe: bool,

    /// CR4.SMAP
    #[arg(long, action = clap::ArgAction::SetTrue)]
    smap: bool,

    /// RFLAGS.AC
    #[arg(long, action = clap::ArgAction::SetTrue)]
    ac: bool,

    /// CR4.SMEP
    #[arg(long, action = clap::ArgAction::SetTrue)]
    smep: bool,

    /// CR0.WP
    #[arg(long, action = clap::ArgAction::SetTrue)]
    wp: bool,

    /// Translate as a user-mode (CPL 3) access
    #[arg(long, action = clap::ArgAction::SetTrue)]
    user: bool,

    /// MAXPHYADDR
    #[arg(long, value_name = "BITS", default_value_t = MAX_PHYS_BITS,
          value_parser = clap::value_parser!(u8).range(4..=52))]
    max_phys_bits: u8,

    /// Kind of access being translated
    #[arg(long, value_enum, default_value_t = Access::Read)]
    access: Access,

    /// Index PAE PDPTEs from CR3 instead of using the raw selector address
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pdpt_uses_root: bool,

    /// Reserve the PSE bits 21:13 only in PDEs that map a 4MB page
    #[arg(long, action = clap::ArgAction::SetTrue)]
    large_pde_reserved_only: bool,

    /// Derive mode and feature flags from this CR0 value (with --cr4/--efer/--rflags/--cpl)
    #[arg(long, value_name = "VALUE", value_parser = parse_u64,
          conflicts_with_all = ["mode", "pse", "nxe", "smap", "ac", "smep", "wp", "user"])]
    cr0: Option<u64>,

    /// CR4 value
    #[arg(long, value_name = "VALUE", value_parser = parse_u64, requires = "cr0")]
    cr4: Option<u64>,

    /// EFER value
    #[arg(long, value_name = "VALUE", value_parser = parse_u64, requires = "cr0")]
    efer: Option<u64>,

    /// RFLAGS value
    #[arg(long, value_name = "VALUE", value_parser = parse_u64, requires = "cr0")]
    rflags: Option<u64>,

    /// Current privilege level
    #[arg(long, value_name = "LEVEL", requires = "cr0",
          value_parser = clap::value_parser!(u8).range(0..=3))]
    cpl: Option<u8>,

    /// Print one JSON object per address
    #[arg(long, action = clap::ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Legacy,
    Pae,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Access {
    Read,
    Write,
    Execute,
}

impl From<Access> for AccessKind {
    fn from(access: Access) -> Self {
        match access {
            Access::Read => AccessKind::Read,
            Access::Write => AccessKind::Write,
            Access::Execute => AccessKind::Execute,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    virtual_address: u32,
    physical_address: u64,
    status: i32,
    error: Option<String>,
    fault_detail: u32,
}

impl Report {
    fn new(vaddr: u32, outcome: &TranslationOutcome) -> Self {
        Self {
            virtual_address: vaddr,
            physical_address: outcome.physical_address,
            status: outcome.status(),
            error: outcome.error.map(|err| err.to_string()),
            fault_detail: outcome.fault_detail.bits(),
        }
    }
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid number {s:?}: {err}"))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let value = parse_u64(s)?;
    u32::try_from(value).map_err(|_| format!("{s:?} does not fit in 32 bits"))
}

fn config_from_args(args: &Args) -> TranslationConfig {
    let base = match args.cr0 {
        Some(cr0) => ControlRegisters {
            cr0,
            cr3: args.cr3,
            cr4: args.cr4.unwrap_or(0),
            efer: args.efer.unwrap_or(0),
            rflags: args.rflags.unwrap_or(0),
            cpl: args.cpl.unwrap_or(0),
        }
        .to_config(),
        None => {
            let mode = match args.mode {
                Mode::Legacy => PagingMode::Legacy,
                Mode::Pae => PagingMode::Pae,
            };
            TranslationConfig::new(mode, args.cr3)
                .with_pse(args.pse)
                .with_nxe(args.nxe)
                .with_smap(args.smap, args.ac)
                .with_smep(args.smep)
                .with_wp(args.wp)
                .with_supervisor(!args.user)
        }
    };

    base.with_pse36(args.pse36)
        .with_pat(args.pat)
        .with_max_phys_bits(args.max_phys_bits)
        .with_access(args.access.into())
        .with_pdpt_uses_root(args.pdpt_uses_root)
        .with_large_pde_reserved_only(args.large_pde_reserved_only)
}

/// Maps the whole image read-only. An empty file has nothing to map.
fn map_image(file: &File) -> io::Result<Option<Mmap>> {
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // SAFETY: the map is only read, and only for the lifetime of this process.
    let mmap = unsafe { MmapOptions::new().map(file)? };
    Ok(Some(mmap))
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let cfg = config_from_args(&args);
    tracing::debug!(?cfg, "translation config");

    if args.cr0.is_some() && !matches!(cfg.mode, PagingMode::Legacy | PagingMode::Pae) {
        tracing::warn!(mode = ?cfg.mode, "registers select a paging mode that cannot be walked");
    }

    let file = File::open(&args.image)
        .with_context(|| format!("open image {}", args.image.display()))?;
    let map = map_image(&file).with_context(|| format!("map image {}", args.image.display()))?;
    let mut mem: &[u8] = map.as_deref().unwrap_or(&[]);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut all_ok = true;

    for &vaddr in &args.vaddrs {
        let outcome = translate(vaddr, &cfg, &mut mem);
        all_ok &= outcome.is_success();

        if args.json {
            serde_json::to_writer(&mut out, &Report::new(vaddr, &outcome))
                .context("write report")?;
            writeln!(out)?;
            continue;
        }

        match outcome.error {
            None => writeln!(out, "{vaddr:#010x} -> {:#x}", outcome.physical_address)?,
            Some(err) => writeln!(
                out,
                "{vaddr:#010x}: {err} (status={}, detail={:#x})",
                outcome.status(),
                outcome.fault_detail.bits()
            )?,
        }
    }
    out.flush()?;

    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
