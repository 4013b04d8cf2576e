//! Reflection feed command

use std::sync::Arc;

use colored::Colorize;

use super::Runtime;
use crate::error::{EmrysError, Result};
use crate::feed::{NeuralFeed, ReflectOutcome};
use crate::models::PersonaPost;
use crate::roster::RosterService;

/// Run the `feed` command
///
/// With `reflect`, a random persona writes a new post first.
pub async fn run_feed(runtime: &Runtime, reflect: bool) -> Result<()> {
    let mut feed = NeuralFeed::new(
        runtime.ctx.clone(),
        Arc::clone(&runtime.gateway),
        Arc::clone(&runtime.inference),
    );
    feed.load().await?;

    if reflect {
        let roster = RosterService::new(
            runtime.ctx.clone(),
            Arc::clone(&runtime.gateway),
            Arc::clone(&runtime.inference),
        );
        let personas = roster.list_personas().await?;
        match feed.reflect(&personas).await? {
            ReflectOutcome::NoPersonas => {
                println!("{}", "Create a persona before asking for reflections.".yellow());
            }
            ReflectOutcome::CredentialRequired => {
                return Err(EmrysError::MissingCredential.into());
            }
            ReflectOutcome::Posted(post) => {
                let author = post.personas.as_ref().map(|a| a.name.as_str()).unwrap_or("A persona");
                println!("{} {}", author.bold(), "shared a new reflection.".green());
            }
        }
    }

    if feed.posts().is_empty() {
        println!("The feed is quiet. Run `emrys feed --reflect` to hear from a persona.");
    }
    for post in feed.posts() {
        print_post(post);
    }
    Ok(())
}

fn print_post(post: &PersonaPost) {
    let author = post
        .personas
        .as_ref()
        .map(|a| a.name.as_str())
        .unwrap_or("Unknown persona");
    let mut header = author.bold().to_string();
    if let Some(mood) = &post.mood_code {
        header.push_str(&format!(" {}", format!("[{}]", mood.hub_label()).magenta()));
    }
    if let Some(at) = post.created_at {
        header.push_str(&format!(" {}", at.format("%Y-%m-%d %H:%M").to_string().dimmed()));
    }
    println!("\n{}\n{}", header, post.content);
}
