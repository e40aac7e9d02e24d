// SPDX-License-Identifier: Apache-2.0, MIT

//! Thin CLI driver: prints GENERAL_INFO and the topology summary for a
//! trajectory file. Formatting only; all decoding is the library's job.

use anyhow::{Context, Result};
use clap::Parser;
use tng::Session;

#[derive(Parser)]
#[command(about = "Summarize a trajectory file's header and topology")]
struct Args {
    /// Path to the trajectory file.
    path: std::path::PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut session = Session::init();
    session
        .set_input_file(&args.path)
        .with_context(|| format!("opening {}", args.path.display()))?;
    session
        .read_file_headers()?
        .success()
        .context("failed to read file headers (see logs for the reported failure)")?;

    let info = session.general_info();
    println!("program_name:   {}", String::from_utf8_lossy(&info.program_name));
    println!("forcefield:     {}", String::from_utf8_lossy(&info.forcefield_name));
    println!("user_name:      {}", String::from_utf8_lossy(&info.user_name));
    println!("created:        {}", session.get_time_str());
    println!("var_num_atoms:  {}", info.var_num_atoms_flag);
    println!("long_stride:    {}", info.long_stride_length);

    let topology = session.topology();
    println!("molecules:      {}", topology.molecules.len());
    for molecule in &topology.molecules {
        println!(
            "  {} (id {}): {} chains, {} residues, {} atoms",
            String::from_utf8_lossy(&molecule.name),
            molecule.id,
            molecule.n_chains(),
            molecule.n_residues(),
            molecule.n_atoms()
        );
    }

    session.destroy();
    Ok(())
}
