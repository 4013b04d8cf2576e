//! Hub management commands

use std::sync::Arc;

use colored::Colorize;
use prettytable::{row, Table};

use super::Runtime;
use crate::cli::HubCommand;
use crate::error::{EmrysError, Result};
use crate::mention;
use crate::models::{Group, GroupDraft};
use crate::roster::RosterService;

/// Run a `hubs` subcommand
pub async fn run_hubs(runtime: &Runtime, command: HubCommand) -> Result<()> {
    let roster = RosterService::new(
        runtime.ctx.clone(),
        Arc::clone(&runtime.gateway),
        Arc::clone(&runtime.inference),
    );

    match command {
        HubCommand::List { json } => {
            let hubs = roster.list_hubs().await?;
            if json {
                let out = serde_json::to_string_pretty(&hubs).map_err(EmrysError::Serialization)?;
                println!("{}", out);
            } else if hubs.is_empty() {
                println!("No hubs yet. Link two or more personas with `emrys hubs create`.");
            } else {
                hubs_table(&hubs).printstd();
            }
        }
        HubCommand::Show { id } => {
            let hub = roster.get_hub(&id).await?;
            print_hub(&hub);
        }
        HubCommand::Create {
            name,
            description,
            personas,
        } => {
            let hub = roster
                .create_hub(&GroupDraft { name, description }, &personas)
                .await?;
            println!(
                "{} {} ({}) with {} personas",
                "Created hub".green(),
                hub.name.bold(),
                hub.id,
                hub.group_members.len()
            );
        }
        HubCommand::Add { id, personas } => {
            let hub = roster.add_hub_members(&id, &personas).await?;
            println!("{} now has {} personas", hub.name.bold(), hub.group_members.len());
        }
        HubCommand::Remove { id, persona } => {
            let hub = roster.remove_hub_member(&id, &persona).await?;
            println!("{} now has {} personas", hub.name.bold(), hub.group_members.len());
        }
        HubCommand::Delete { id } => {
            roster.delete_hub(&id).await?;
            println!("Deleted hub {}", id);
        }
    }
    Ok(())
}

fn hubs_table(hubs: &[Group]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["ID", "Name", "Personas", "Description"]);
    for hub in hubs {
        let names: Vec<&str> = hub.personas().into_iter().map(|p| p.name()).collect();
        table.add_row(row![
            hub.id,
            hub.name,
            names.join(", "),
            hub.description.as_deref().unwrap_or("-")
        ]);
    }
    table
}

fn print_hub(hub: &Group) {
    println!("\n{} ({})", hub.name.bold(), hub.id.dimmed());
    if let Some(description) = &hub.description {
        println!("{}", description);
    }
    println!();
    for persona in hub.personas() {
        let role = persona.profile.occupation.as_deref().unwrap_or("");
        println!(
            "  {:<24} {:<20} {}",
            mention::mention_text(persona.name()).trim_end(),
            persona.name(),
            role.dimmed()
        );
    }
    let unresolved = hub.group_members.len() - hub.personas().len();
    if unresolved > 0 {
        println!("  ({} linked personas could not be loaded)", unresolved);
    }
    println!();
}
