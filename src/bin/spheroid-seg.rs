//! Spheroid segmentation CLI tool
//!
//! Command-line interface for running tumour spheroid segmentation models
//! over biomedical micrographs with the spheroid-seg library.

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    spheroid_seg::cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
