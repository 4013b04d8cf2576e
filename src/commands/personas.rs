//! Persona management commands
//!
//! Lists, shows, creates, updates and deletes personas, and manages the knowledge
//! entries a persona has learned.

use std::sync::Arc;

use colored::Colorize;
use prettytable::{row, Table};

use super::Runtime;
use crate::cli::PersonaCommand;
use crate::error::{EmrysError, Result};
use crate::models::{KnowledgeEntry, Persona, PersonaDraft};
use crate::roster::RosterService;

/// Run a `personas` subcommand
pub async fn run_personas(runtime: &Runtime, command: PersonaCommand) -> Result<()> {
    let roster = RosterService::new(
        runtime.ctx.clone(),
        Arc::clone(&runtime.gateway),
        Arc::clone(&runtime.inference),
    );

    match command {
        PersonaCommand::List { public, json } => {
            let personas = if public {
                roster.list_public_personas().await?
            } else {
                roster.list_personas().await?
            };
            if json {
                println!("{}", personas_json(&personas)?);
            } else if personas.is_empty() {
                println!("No personas yet. Create one with `emrys personas create --name <NAME>`.");
            } else {
                personas_table(&personas).printstd();
            }
        }
        PersonaCommand::Show { id } => {
            let persona = roster.get_persona(&id).await?;
            print_persona(&persona);
        }
        PersonaCommand::Create {
            name,
            occupation,
            background,
            public,
        } => {
            let draft = PersonaDraft {
                occupation,
                background_story: background,
                is_public: public,
                ..PersonaDraft::named(name)
            };
            let persona = roster.create_persona(&draft).await?;
            println!(
                "{} {} ({})",
                "Created persona".green(),
                persona.name().bold(),
                persona.id
            );
        }
        PersonaCommand::Update {
            id,
            name,
            occupation,
            background,
            public,
        } => {
            let current = roster.get_persona(&id).await?;
            let mut draft = current.profile;
            if let Some(name) = name {
                draft.name = name;
            }
            if occupation.is_some() {
                draft.occupation = occupation;
            }
            if background.is_some() {
                draft.background_story = background;
            }
            if let Some(public) = public {
                draft.is_public = public;
            }
            let persona = roster.update_persona(&id, &draft).await?;
            println!("{} {}", "Updated persona".green(), persona.name().bold());
        }
        PersonaCommand::Delete { id } => {
            roster.delete_persona(&id).await?;
            println!("Deleted persona {}", id);
        }
        PersonaCommand::Learn {
            id,
            category,
            key,
            value,
        } => {
            let entry = roster.learn(&id, &category, &key, &value).await?;
            println!(
                "{} [{}] {} = {}",
                "Learned".green(),
                entry.category,
                entry.key,
                entry.value
            );
        }
        PersonaCommand::Knowledge { id } => {
            let entries = roster.knowledge(&id).await?;
            if entries.is_empty() {
                println!("No knowledge entries for persona {}", id);
            } else {
                knowledge_table(&entries).printstd();
            }
        }
    }
    Ok(())
}

fn personas_json(personas: &[Persona]) -> Result<String> {
    Ok(serde_json::to_string_pretty(personas).map_err(EmrysError::Serialization)?)
}

fn personas_table(personas: &[Persona]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["ID", "Name", "Occupation", "Public", "Uses"]);
    for persona in personas {
        table.add_row(row![
            persona.id,
            persona.name(),
            persona.profile.occupation.as_deref().unwrap_or("-"),
            if persona.profile.is_public { "yes" } else { "no" },
            persona.use_count
        ]);
    }
    table
}

fn knowledge_table(entries: &[KnowledgeEntry]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Category", "Key", "Value", "Source"]);
    for entry in entries {
        table.add_row(row![entry.category, entry.key, entry.value, entry.source]);
    }
    table
}

fn print_persona(persona: &Persona) {
    let profile = &persona.profile;
    println!("\n{} ({})", persona.name().bold(), persona.id.dimmed());

    let fields = [
        ("Occupation", profile.occupation.clone()),
        ("Age", profile.age.map(|a| a.to_string())),
        ("Location", profile.location.clone()),
        ("Style", profile.response_style.clone()),
        ("Formality", profile.formality_level.clone()),
        ("Humor", profile.humor_level.clone()),
        ("Greeting", profile.typical_greeting.clone()),
        ("Achievements", profile.achievements.clone()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {:<13} {}", format!("{}:", label), value);
        }
    }

    let lists = [
        ("Traits", &profile.personality_traits),
        ("Values", &profile.values),
        ("Interests", &profile.interests),
        ("Catchphrases", &profile.catchphrases),
    ];
    for (label, items) in lists {
        if !items.is_empty() {
            println!("  {:<13} {}", format!("{}:", label), items.join(", "));
        }
    }

    if let Some(story) = &profile.background_story {
        println!("\n{}\n", story);
    }
    println!(
        "  {} · used {} times",
        if profile.is_public { "public" } else { "private" },
        persona.use_count
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(id: &str, name: &str, occupation: Option<&str>) -> Persona {
        Persona {
            id: id.to_string(),
            user_id: Some("u1".to_string()),
            profile: PersonaDraft {
                occupation: occupation.map(str::to_string),
                ..PersonaDraft::named(name)
            },
            use_count: 3,
            created_at: None,
        }
    }

    #[test]
    fn test_personas_table_has_header_and_rows() {
        let table = personas_table(&[
            persona("p1", "Ada", Some("Mathematician")),
            persona("p2", "Grace", None),
        ]);
        assert_eq!(table.len(), 3);
        let rendered = table.to_string();
        assert!(rendered.contains("Mathematician"));
        assert!(rendered.contains("Grace"));
    }

    #[test]
    fn test_personas_json_flattens_profile() {
        let json = personas_json(&[persona("p1", "Ada", None)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["id"], "p1");
        assert_eq!(value[0]["name"], "Ada");
        assert_eq!(value[0]["use_count"], 3);
    }

    #[test]
    fn test_knowledge_table() {
        let table = knowledge_table(&[KnowledgeEntry::new("p1", "fact", "pet", "a cat")]);
        assert_eq!(table.len(), 2);
        assert!(table.to_string().contains("conversation"));
    }
}
