//! A simple CLI tool for verifying ballot ledger exports.
//! This uses the server's own chain verification and replay, and is by
//! definition compatible with the output of `GET /ledger/export`.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use ballot_ledger::error::ChainError;
use ballot_ledger::model::{
    api::ledger::LedgerExport,
    ballot::{winners, CandidateTally},
    candidate::CandidateId,
    election::ElectionId,
    event::verify_chain,
    state::LedgerState,
};

const PROGRAM_NAME: &str = "verify-ledger";

const ABOUT_TEXT: &str = "Verify the integrity of a ballot ledger and recount its elections.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const EXPORT_PATH: &str = "EXPORT_PATH";

const EXPORT_PATH_HELP: &str = "The path to a JSON export of the ledger,\n\
as returned by `GET /ledger/export`";

const ELECTION: &str = "election";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(EXPORT_PATH)
                .help(EXPORT_PATH_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(ELECTION)
                .long(ELECTION)
                .help("Only report on the election with this ID")
                .action(ArgAction::Set)
                .value_parser(value_parser!(ElectionId)),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON export.
    Format(String),
    /// Verification failed due to the contained reason.
    Verification(ChainError),
    /// The export does not end where it claims to.
    WrongHead,
    /// The requested election is not in the ledger.
    NoSuchElection(ElectionId),
}

impl From<ChainError> for Error {
    fn from(err: ChainError) -> Self {
        Self::Verification(err)
    }
}

/// The recount of a single position.
#[derive(Debug, Eq, PartialEq)]
struct PositionRecount {
    pub election_id: ElectionId,
    pub position: String,
    /// Approved candidates in ID order, with their names.
    pub tallies: Vec<(CandidateTally, String)>,
    pub winners: Vec<CandidateId>,
}

impl Display for PositionRecount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Election {}, {}:", self.election_id, self.position)?;
        for (tally, name) in &self.tallies {
            let mark = if self.winners.contains(&tally.candidate_id) {
                " (winner)"
            } else {
                ""
            };
            writeln!(
                f,
                "  {}. {}: {} vote{}{}",
                tally.candidate_id,
                name,
                tally.votes,
                if tally.votes != 1 { "s" } else { "" },
                mark
            )?;
        }
        if self.tallies.is_empty() {
            writeln!(f, "  no approved candidates")?;
        }
        Ok(())
    }
}

/// Run verification.
fn verify(path: &str, only: Option<ElectionId>) -> Result<Vec<PositionRecount>, Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let export: LedgerExport =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;

    // Check the chain, then rebuild the state from it.
    let head = verify_chain(&export.events)?;
    if head != export.head {
        return Err(Error::WrongHead);
    }
    let state = LedgerState::replay(&export.events)?;

    let mut recounts = Vec::new();
    for election in state.elections() {
        if only.map_or(false, |id| id != election.id) {
            continue;
        }
        for position in election.positions.values() {
            // The same count the server reports, paired with the ballot's names.
            let counts = state
                .election_result(election.id, &position.name)
                .map_err(|err| Error::Format(err.to_string()))?;
            let tallies = counts
                .iter()
                .copied()
                .zip(position.approved().map(|candidate| candidate.name.clone()))
                .collect();
            recounts.push(PositionRecount {
                election_id: election.id,
                position: position.name.clone(),
                winners: winners(&counts),
                tallies,
            });
        }
    }

    match only {
        Some(id) if state.election(id).is_err() => Err(Error::NoSuchElection(id)),
        _ => Ok(recounts),
    }
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let Some(path) = args.get_one::<String>(EXPORT_PATH) else {
        println!("No export path given.");
        return 1;
    };
    let only = args.get_one::<ElectionId>(ELECTION).copied();
    match verify(path, only) {
        Ok(recounts) => {
            println!("Verification succeeded.");
            for recount in recounts {
                print!("{recount}");
            }
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {msg}");
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {msg}");
            1
        }
        Err(Error::NoSuchElection(id)) => {
            println!("The ledger has no election {id}.");
            1
        }
        Err(Error::WrongHead) => {
            println!("Verification failed: the export's head does not match its events.");
            255
        }
        Err(Error::Verification(err)) => {
            println!("Verification failed: {err}.");
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
