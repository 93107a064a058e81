//! Dev helper for contributing to vertree: inspects and diffs the canonical
//! roster/cset text format from the command line, without needing a
//! database or a working directory.

use std::{fs, path::PathBuf, process::exit};

use clap::{Parser, Subcommand};
use vertree::basic_io::{parse_roster, write_canonical_cset, write_canonical_roster};
use vertree::cset::diff_rosters;
use vertree::revision::hash_manifest;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a roster file and print its manifest hash
    Manifest {
        /// Path to a canonical roster text file
        path: PathBuf,
    },
    /// Parse a roster file and check its structural invariants
    Check {
        /// Path to a canonical roster text file
        path: PathBuf,
    },
    /// Print the cset that would take `base` to `target`
    Diff {
        /// Path to the base roster
        base: PathBuf,
        /// Path to the target roster
        target: PathBuf,
    },
}

fn main() {
    stderrlog::new().module(module_path!()).init().unwrap();

    match real_main(&CliArgs::parse()) {
        Ok(exit_code) => exit(exit_code),
        Err(error) => {
            eprintln!("xdev: {error}");
            exit(-1)
        }
    }
}

fn read_roster(path: &PathBuf) -> Result<vertree::Roster, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("could not read {}: {err}", path.display()))?;
    let (roster, _) = parse_roster(&text, false).map_err(|err| format!("{}: {err}", path.display()))?;
    Ok(roster)
}

fn real_main(args: &CliArgs) -> Result<i32, String> {
    match &args.command {
        Command::Manifest { path } => {
            let roster = read_roster(path)?;
            let id = hash_manifest(&roster).map_err(|err| err.to_string())?;
            println!("{id}");
            Ok(0)
        }
        Command::Check { path } => {
            let roster = read_roster(path)?;
            roster.check_sane().map_err(|err| err.to_string())?;
            println!("{} nodes, sane", roster.node_count());
            Ok(0)
        }
        Command::Diff { base, target } => {
            let base = read_roster(base)?;
            let target = read_roster(target)?;
            let cs = diff_rosters(&base, &target).map_err(|err| err.to_string())?;
            print!("{}", write_canonical_cset(&cs));
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }

    #[test]
    fn manifest_on_empty_roster() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("empty.roster");
        fs::write(&path, write_canonical_roster(&vertree::Roster::empty(), None).unwrap()).unwrap();
        assert_eq!(real_main(&CliArgs::parse_from(["xdev", "manifest", path.to_str().unwrap()])), Ok(0));
    }

    #[test]
    fn check_reports_node_count() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("empty.roster");
        fs::write(&path, write_canonical_roster(&vertree::Roster::empty(), None).unwrap()).unwrap();
        assert_eq!(real_main(&CliArgs::parse_from(["xdev", "check", path.to_str().unwrap()])), Ok(0));
    }
}
