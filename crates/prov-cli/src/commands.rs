use anyhow::Context;
use colored::Colorize;
use serde::Serialize;

use prov_ledger::{Event, LedgerConfig, Provenance, TestReport};
use prov_store::InMemoryStore;
use prov_types::CommodityType;

use crate::cli::*;

type Engine = Provenance<InMemoryStore>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    let store = InMemoryStore::open(&cli.state)
        .with_context(|| format!("opening {}", cli.state.display()))?;
    let engine = Provenance::new(store, config);
    let out = Output { format: cli.format };

    let mutated = match cli.command {
        Command::Participant(cmd) => cmd_participant(&engine, &out, cmd)?,
        Command::Commodity(cmd) => cmd_commodity(&engine, &out, cmd)?,
        Command::Lot(cmd) => cmd_lot(&engine, &out, cmd)?,
        Command::Package(cmd) => cmd_package(&engine, &out, cmd)?,
        Command::Trace(args) => cmd_trace(&engine, &out, args).map(|_| false)?,
        Command::Impact(args) => cmd_impact(&engine, &out, args).map(|_| false)?,
        Command::Verify(args) => cmd_verify(&engine, &out, args).map(|_| false)?,
        Command::Audit => cmd_audit(&engine, &out).map(|_| false)?,
        Command::History(args) => cmd_history(&engine, &out, args).map(|_| false)?,
    };

    if mutated {
        if let Err(e) = engine.store().save(&cli.state) {
            if e.is_conflict() {
                anyhow::bail!(
                    "{} was updated by another command; nothing was saved, re-run this one",
                    cli.state.display()
                );
            }
            return Err(e).with_context(|| format!("saving {}", cli.state.display()));
        }
    }
    Ok(())
}

struct Output {
    format: OutputFormat,
}

impl Output {
    /// Print `value` as JSON, or run `text` for human output.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

fn ok(message: impl std::fmt::Display) {
    println!("{} {message}", "✓".green().bold());
}

fn print_event(event: &Event) {
    println!(
        "  {} {:<20} {:<20} {:>12}  {}",
        event.timestamp.to_string().dimmed(),
        event.entity.to_string().cyan(),
        event.kind.to_string().yellow(),
        event.quantity_delta.to_string(),
        event.actor,
    );
}

fn cmd_participant(engine: &Engine, out: &Output, cmd: ParticipantCommand) -> anyhow::Result<bool> {
    match cmd {
        ParticipantCommand::Register { id, role, name } => {
            let name = name.unwrap_or_else(|| id.to_string());
            let record = engine.register_participant(id, role, &name)?;
            out.emit(&record, || {
                ok(format_args!("Registered {} as {}", record.id.to_string().bold(), record.role))
            })?;
            Ok(true)
        }
        ParticipantCommand::Show { id } => {
            let record = engine.participant(&id)?;
            out.emit(&record, || {
                println!("{} ({})", record.id.to_string().bold(), record.role);
                println!("  Name: {}", record.display_name);
                println!("  Registered: {}", record.registered_at);
            })?;
            Ok(false)
        }
    }
}

fn cmd_commodity(engine: &Engine, out: &Output, cmd: CommodityCommand) -> anyhow::Result<bool> {
    match cmd {
        CommodityCommand::Register {
            id,
            name,
            category,
            shelf_life_months,
        } => {
            let record =
                engine.register_commodity(CommodityType::new(id, name, category, shelf_life_months))?;
            out.emit(&record, || {
                ok(format_args!("Registered commodity {}", record.commodity.id.to_string().bold()))
            })?;
            Ok(true)
        }
        CommodityCommand::Show { id } => {
            let record = engine.commodity(&id)?;
            out.emit(&record, || {
                let c = &record.commodity;
                println!("{} ({})", c.name.bold(), c.id);
                println!("  Category: {}", c.category);
                match c.shelf_life_months {
                    Some(m) => println!("  Shelf life: {m} months"),
                    None => println!("  Shelf life: {}", "none".dimmed()),
                }
            })?;
            Ok(false)
        }
    }
}

fn cmd_lot(engine: &Engine, out: &Output, cmd: LotCommand) -> anyhow::Result<bool> {
    match cmd {
        LotCommand::Create {
            commodity,
            quantity,
            actor,
        } => {
            let lot = engine.create_lot(&commodity, quantity, &actor.context())?;
            out.emit(&lot, || ok(format_args!("Created {} ({quantity} {commodity})", lot.to_string().cyan())))?;
            Ok(true)
        }
        LotCommand::Show { lot } => {
            let view = engine.lot(lot)?;
            out.emit(&view, || {
                println!("{}", view.lot.id.to_string().cyan().bold());
                println!("  Commodity: {}", view.lot.commodity);
                println!("  Custodian: {}", view.lot.custodian);
                println!("  State: {}", view.lot.state.to_string().yellow());
                println!("  Recorded: {}", view.lot.quantity_recorded);
                println!("  Available: {}", view.available.to_string().bold());
            })?;
            Ok(false)
        }
        LotCommand::Test {
            lot,
            test_type,
            outcome,
            grade,
            notes,
            actor,
        } => {
            let report = TestReport {
                test_type,
                outcome: outcome.into(),
                grade,
                notes,
            };
            let event = engine.record_test(lot, report, &actor.context())?;
            out.emit(&event, || ok(format_args!("Recorded test on {} (seq {})", lot.to_string().cyan(), event.seq)))?;
            Ok(true)
        }
        LotCommand::Split { lot, parts, actor } => {
            let children = engine.split(lot, &parts, &actor.context())?;
            out.emit(&children, || {
                ok(format_args!("Split {} into {} lots", lot.to_string().cyan(), children.len()));
                for (child, part) in children.iter().zip(&parts) {
                    println!("  {} {}", child.to_string().cyan(), part.quantity);
                }
            })?;
            Ok(true)
        }
        LotCommand::Transfer {
            lot,
            to,
            quantity,
            actor,
        } => {
            let held = engine.transfer(lot, &to, quantity, &actor.context())?;
            out.emit(&held, || {
                if held == lot {
                    ok(format_args!("Transferred {} to {}", lot.to_string().cyan(), to.to_string().bold()));
                } else {
                    ok(format_args!(
                        "Transferred {quantity} of {} to {} as {}",
                        lot.to_string().cyan(),
                        to.to_string().bold(),
                        held.to_string().cyan()
                    ));
                }
            })?;
            Ok(true)
        }
    }
}

fn cmd_package(engine: &Engine, out: &Output, cmd: PackageCommand) -> anyhow::Result<bool> {
    match cmd {
        PackageCommand::Create {
            label,
            contents,
            actor,
        } => {
            let package = engine.consolidate(&contents, &label, &actor.context())?;
            out.emit(&package, || ok(format_args!("Sealed {} as {}", label.bold(), package.to_string().cyan())))?;
            Ok(true)
        }
        PackageCommand::Show { label } => {
            let package = engine.package(&label)?;
            out.emit(&package, || {
                println!("{} ({})", package.label.bold(), package.id.to_string().cyan());
                println!("  Custodian: {}", package.custodian);
                println!("  Total: {}", package.total);
                match package.expires_at {
                    Some(at) => println!("  Expires: {}", at.date_naive()),
                    None => println!("  Expires: {}", "never".dimmed()),
                }
                for content in &package.contents {
                    println!("  {} {} {}", content.lot.to_string().cyan(), content.commodity, content.quantity);
                }
            })?;
            Ok(false)
        }
        PackageCommand::Transfer { label, to, actor } => {
            let package = engine.transfer_package(&label, &to, &actor.context())?;
            out.emit(&package, || ok(format_args!("Transferred {} to {}", label.bold(), to.to_string().bold())))?;
            Ok(true)
        }
    }
}

fn cmd_trace(engine: &Engine, out: &Output, args: TraceArgs) -> anyhow::Result<()> {
    let trace = engine.trace(&args.label)?;
    if let Some(path) = &args.export_graph {
        let bytes = trace.subgraph()?.to_bytes()?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    out.emit(&trace, || {
        println!("Lineage of {} ({})", trace.package.label.bold(), trace.package.id.to_string().cyan());
        println!(
            "  Origins: {}",
            trace.origins.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(", ").green()
        );
        println!("  Nodes: {}, edges: {}", trace.nodes.len(), trace.edges.len());
        for edge in &trace.edges {
            println!("  {edge}");
        }
        println!("Events:");
        trace.events.iter().for_each(print_event);
    })
}

fn cmd_impact(engine: &Engine, out: &Output, args: ImpactArgs) -> anyhow::Result<()> {
    let report = engine.impact(args.lot)?;
    out.emit(&report, || {
        if report.is_empty() {
            println!("Nothing downstream of {}.", args.lot.to_string().cyan());
            return;
        }
        println!("Impact of {} (depth {})", args.lot.to_string().cyan().bold(), report.cascade_depth);
        for lot in &report.lots {
            println!("  lot {} (depth {})", lot.id.to_string().cyan(), lot.depth);
        }
        for package in &report.packages {
            println!("  {} {} (depth {})", "package".red(), package.id.to_string().cyan(), package.depth);
        }
    })
}

fn cmd_verify(engine: &Engine, out: &Output, args: VerifyArgs) -> anyhow::Result<()> {
    let valid = engine.verify_chain(&args.entity)?;
    out.emit(&valid, || ok(format_args!("Hash chain of {} verified", args.entity.to_string().cyan())))
}

fn cmd_audit(engine: &Engine, out: &Output) -> anyhow::Result<()> {
    let report = engine.audit()?;
    out.emit(&report, || {
        if report.is_clean() {
            ok("Audit clean");
        } else {
            println!("{} {} violations", "✗".red().bold(), report.violations.len());
            for violation in &report.violations {
                println!("  {violation}");
            }
        }
        println!(
            "  Lots: {}, packages: {}, edges: {}, events: {}",
            report.lots_checked, report.packages_checked, report.edges_checked, report.events_checked
        );
    })?;
    if !report.is_clean() {
        anyhow::bail!("audit found {} violations", report.violations.len());
    }
    Ok(())
}

fn cmd_history(engine: &Engine, out: &Output, args: HistoryArgs) -> anyhow::Result<()> {
    let events = engine.history(&args.entity)?;
    out.emit(&events, || {
        println!("History of {}", args.entity.to_string().cyan().bold());
        events.iter().for_each(print_event);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use prov_types::{ActorContext, Grams, Role};

    fn run(state: &std::path::Path, args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["prov", "--state", state.to_str().unwrap(), "--format", "json"];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv)?)
    }

    #[test]
    fn state_persists_between_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("ledger.json");
        run(&state, &["participant", "register", "farmer", "--role", "producer"]).unwrap();
        run(&state, &["commodity", "register", "pepper", "--name", "Pepper", "--category", "spice"]).unwrap();
        run(&state, &["lot", "create", "--commodity", "pepper", "--quantity", "1000", "--as", "farmer", "--role", "producer"]).unwrap();
        assert!(state.exists());

        let engine = Provenance::new(InMemoryStore::open(&state).unwrap(), LedgerConfig::default());
        assert!(engine.participant(&"farmer".parse().unwrap()).is_ok());
        run(&state, &["audit"]).unwrap();
    }

    #[test]
    fn concurrent_writers_cannot_both_save() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("ledger.json");
        run(&state, &["participant", "register", "farmer", "--role", "producer"]).unwrap();
        run(&state, &["commodity", "register", "pepper", "--name", "Pepper", "--category", "spice"]).unwrap();

        let farmer = ActorContext::new("farmer".parse().unwrap(), Role::Producer);
        let seed = Provenance::new(InMemoryStore::open(&state).unwrap(), LedgerConfig::default());
        let lot = seed
            .create_lot(&"pepper".parse().unwrap(), Grams::from_grams(150).unwrap(), &farmer)
            .unwrap();
        seed.store().save(&state).unwrap();

        let a = Provenance::new(InMemoryStore::open(&state).unwrap(), LedgerConfig::default());
        let b = Provenance::new(InMemoryStore::open(&state).unwrap(), LedgerConfig::default());
        let hundred = Grams::from_grams(100).unwrap();
        a.consolidate(&[(lot, hundred)], "A", &farmer).unwrap();
        b.consolidate(&[(lot, hundred)], "B", &farmer).unwrap();

        a.store().save(&state).unwrap();
        assert!(b.store().save(&state).unwrap_err().is_conflict());

        let reopened = Provenance::new(InMemoryStore::open(&state).unwrap(), LedgerConfig::default());
        assert!(reopened.package("A").is_ok());
        assert!(reopened.package("B").is_err());
        assert_eq!(reopened.lot(lot).unwrap().available, Grams::from_grams(50).unwrap());
        run(&state, &["audit"]).unwrap();
    }

    #[test]
    fn trace_exports_composition_graph() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("ledger.json");
        let graph = dir.path().join("P1.dag");
        run(&state, &["participant", "register", "farmer", "--role", "producer"]).unwrap();
        run(&state, &["commodity", "register", "pepper", "--name", "Pepper", "--category", "spice"]).unwrap();

        let farmer = ActorContext::new("farmer".parse().unwrap(), Role::Producer);
        let engine = Provenance::new(InMemoryStore::open(&state).unwrap(), LedgerConfig::default());
        let lot = engine
            .create_lot(&"pepper".parse().unwrap(), Grams::from_grams(10).unwrap(), &farmer)
            .unwrap();
        engine.consolidate(&[(lot, Grams::from_grams(4).unwrap())], "P1", &farmer).unwrap();
        engine.store().save(&state).unwrap();

        run(&state, &["trace", "P1", "--export-graph", graph.to_str().unwrap()]).unwrap();
        let expected = engine.trace("P1").unwrap().subgraph().unwrap().to_bytes().unwrap();
        assert_eq!(std::fs::read(&graph).unwrap(), expected);
    }

    #[test]
    fn ledger_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("ledger.json");
        let err = run(&state, &["package", "show", "missing"]).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(!state.exists());
    }
}
