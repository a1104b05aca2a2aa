use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use prov_ledger::{Division, TestOutcome};
use prov_types::{
    ActorContext, CommodityId, EntityId, Grams, LotId, ParticipantId, Role,
};

#[derive(Parser)]
#[command(
    name = "prov",
    about = "Provenance ledger: trace a commodity from harvest to sealed package",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Ledger state file; created on first write.
    #[arg(long, global = true, default_value = "provenance.json")]
    pub state: PathBuf,

    /// Engine configuration (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Register or inspect participants
    #[command(subcommand)]
    Participant(ParticipantCommand),
    /// Register commodity reference data
    #[command(subcommand)]
    Commodity(CommodityCommand),
    /// Create, test, split, and transfer lots
    #[command(subcommand)]
    Lot(LotCommand),
    /// Seal, inspect, and transfer packages
    #[command(subcommand)]
    Package(PackageCommand),
    /// Full lineage of a package, back to every origin lot
    Trace(TraceArgs),
    /// Everything made from a lot
    Impact(ImpactArgs),
    /// Verify one entity's hash chain
    Verify(VerifyArgs),
    /// Check every ledger invariant
    Audit,
    /// Show an entity's events
    History(HistoryArgs),
}

/// Caller identity, as the auth layer would supply it.
#[derive(Args, Clone, Debug)]
pub struct ActorArgs {
    /// Participant performing the action
    #[arg(long = "as", value_name = "PARTICIPANT")]
    pub actor: ParticipantId,
    #[arg(long)]
    pub role: Role,
}

impl ActorArgs {
    pub fn context(&self) -> ActorContext {
        ActorContext::new(self.actor.clone(), self.role)
    }
}

#[derive(Subcommand)]
pub enum ParticipantCommand {
    Register {
        id: ParticipantId,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        name: Option<String>,
    },
    Show {
        id: ParticipantId,
    },
}

#[derive(Subcommand)]
pub enum CommodityCommand {
    Register {
        id: CommodityId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        shelf_life_months: Option<u32>,
    },
    Show {
        id: CommodityId,
    },
}

#[derive(Subcommand)]
pub enum LotCommand {
    /// Register a harvested origin lot
    Create {
        #[arg(long)]
        commodity: CommodityId,
        #[arg(long)]
        quantity: Grams,
        #[command(flatten)]
        actor: ActorArgs,
    },
    Show {
        lot: LotId,
    },
    /// Attest a quality test
    Test {
        lot: LotId,
        #[arg(long)]
        test_type: String,
        #[arg(long)]
        outcome: OutcomeArg,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Divide a lot; each --part is QUANTITY or QUANTITY:RECIPIENT
    Split {
        lot: LotId,
        #[arg(long = "part", required = true, value_parser = parse_division)]
        parts: Vec<Division>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Hand a lot, or part of it, to another custodian
    Transfer {
        lot: LotId,
        #[arg(long)]
        to: ParticipantId,
        #[arg(long)]
        quantity: Grams,
        #[command(flatten)]
        actor: ActorArgs,
    },
}

#[derive(Subcommand)]
pub enum PackageCommand {
    /// Seal lots into a labelled package; each --content is LOT=QUANTITY
    Create {
        label: String,
        #[arg(long = "content", required = true, value_parser = parse_content)]
        contents: Vec<(LotId, Grams)>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    Show {
        label: String,
    },
    Transfer {
        label: String,
        #[arg(long)]
        to: ParticipantId,
        #[command(flatten)]
        actor: ActorArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutcomeArg {
    Passed,
    Failed,
}

impl From<OutcomeArg> for TestOutcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Passed => TestOutcome::Passed,
            OutcomeArg::Failed => TestOutcome::Failed,
        }
    }
}

#[derive(Args)]
pub struct TraceArgs {
    pub label: String,
    /// Also write the composition subgraph (bincode) to this file
    #[arg(long)]
    pub export_graph: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImpactArgs {
    pub lot: LotId,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// `lot:<uuid>` or `pkg:<uuid>`
    pub entity: EntityId,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub entity: EntityId,
}

fn parse_division(s: &str) -> Result<Division, String> {
    match s.split_once(':') {
        Some((quantity, recipient)) => Ok(Division::to(
            quantity.parse().map_err(|e| format!("{e}"))?,
            recipient.parse().map_err(|e| format!("{e}"))?,
        )),
        None => Ok(Division::new(s.parse().map_err(|e| format!("{e}"))?)),
    }
}

fn parse_content(s: &str) -> Result<(LotId, Grams), String> {
    let (lot, quantity) = s
        .split_once('=')
        .ok_or_else(|| format!("{s}: expected LOT=QUANTITY"))?;
    Ok((
        lot.parse().map_err(|e| format!("{e}"))?,
        quantity.parse().map_err(|e| format!("{e}"))?,
    ))
}
