//! Batch instruction files.
//!
//! One instruction per line, whitespace separated:
//!
//! ```text
//! thing 1234 5678
//! collection alice printer-upgrades tools
//! user alice bob
//! likes alice
//! ```
//!
//! Blank lines are skipped. Unknown or incomplete instructions are logged and
//! skipped; they never abort the batch.

use super::Mirror;
use crate::error::{Error, Result};
use crate::remote::Grouping;
use crate::types::ArtifactId;
use std::path::Path;

/// One parsed batch line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Sync these things
    Thing(Vec<ArtifactId>),
    /// Sync named collections of one owner
    Collection {
        /// Collection owner
        owner: String,
        /// Collection names
        names: Vec<String>,
    },
    /// Sync everything these users designed
    User(Vec<String>),
    /// Sync everything these users liked
    Likes(Vec<String>),
}

/// A batch line that could not be understood
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// The first token is not a known instruction
    #[error("unknown instruction '{0}'")]
    UnknownInstruction(String),

    /// Not enough arguments for the instruction
    #[error("'{instruction}' needs at least {expected} argument(s)")]
    MissingArguments {
        /// Instruction name
        instruction: String,
        /// Minimum number of arguments
        expected: usize,
    },
}

/// Parse one batch line
///
/// Returns `None` for blank lines.
pub fn parse_instruction(line: &str) -> Option<std::result::Result<Instruction, BatchError>> {
    let mut tokens = line.split_whitespace();
    let command = tokens.next()?;
    let args: Vec<String> = tokens.map(str::to_string).collect();

    let require = |expected: usize| {
        if args.len() < expected {
            Err(BatchError::MissingArguments {
                instruction: command.to_string(),
                expected,
            })
        } else {
            Ok(())
        }
    };

    let parsed = match command {
        "thing" => require(1).map(|()| {
            Instruction::Thing(args.iter().map(|id| ArtifactId::from(id.as_str())).collect())
        }),
        "collection" => require(2).map(|()| Instruction::Collection {
            owner: args[0].clone(),
            names: args[1..].to_vec(),
        }),
        "user" => require(1).map(|()| Instruction::User(args.clone())),
        "likes" => require(1).map(|()| Instruction::Likes(args.clone())),
        other => Err(BatchError::UnknownInstruction(other.to_string())),
    };
    Some(parsed)
}

impl Mirror {
    /// Run every instruction of a batch file in order, inline
    ///
    /// # Errors
    ///
    /// Returns an error only if the file cannot be read.
    pub async fn run_batch(&self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Other(format!(
                "failed to read batch file '{}': {}",
                path.display(),
                e
            ))
        })?;

        for (number, line) in content.lines().enumerate() {
            let line_number = number + 1;
            match parse_instruction(line) {
                None => {}
                Some(Ok(instruction)) => {
                    tracing::info!(line = line_number, ?instruction, "handling batch instruction");
                    self.execute(instruction).await;
                }
                Some(Err(e)) => {
                    tracing::warn!(line = line_number, error = %e, "skipping batch instruction");
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, instruction: Instruction) {
        let base = self.target_dir().to_path_buf();
        let groupings: Vec<Grouping> = match instruction {
            Instruction::Thing(ids) => {
                for id in ids {
                    self.sync_thing(id).await;
                }
                return;
            }
            Instruction::Collection { owner, names } => names
                .iter()
                .map(|name| Grouping::collection(&owner, name, &base))
                .collect(),
            Instruction::User(users) => users
                .iter()
                .map(|user| Grouping::designs(user, &base))
                .collect(),
            Instruction::Likes(users) => users
                .iter()
                .map(|user| Grouping::likes(user, &base))
                .collect(),
        };

        for grouping in groupings {
            if let Err(e) = self.sync_grouping(&grouping).await {
                tracing::error!(grouping = %grouping.label(), error = %e, "grouping failed");
            }
        }
    }
}
