//! Persona and hub management
//!
//! Thin validated layer over the persistence gateway for the roster screens:
//! persona CRUD, knowledge entries, hub CRUD and membership, and persona
//! synthesis through the inference backend.

use std::sync::Arc;

use crate::chat::load_error;
use crate::credential::SessionContext;
use crate::error::{EmrysError, Result};
use crate::gateway::PersistenceGateway;
use crate::inference::{ApiKey, InferenceClient, SynthesisRequest};
use crate::models::{Group, GroupDraft, KnowledgeEntry, Persona, PersonaDraft};

/// Roster operations for the signed-in user
pub struct RosterService {
    ctx: SessionContext,
    gateway: Arc<dyn PersistenceGateway>,
    inference: Arc<dyn InferenceClient>,
}

/// Removes duplicate ids, keeping first occurrences in order
fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !unique.iter().any(|u| u == id) {
            unique.push(id.to_string());
        }
    }
    unique
}

impl RosterService {
    pub fn new(
        ctx: SessionContext,
        gateway: Arc<dyn PersistenceGateway>,
        inference: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            ctx,
            gateway,
            inference,
        }
    }

    /// The user's personas, newest first
    pub async fn list_personas(&self) -> Result<Vec<Persona>> {
        self.gateway
            .list_personas(self.ctx.user_id())
            .await
            .map_err(|e| load_error("personas", e))
    }

    /// Public personas, most used first
    pub async fn list_public_personas(&self) -> Result<Vec<Persona>> {
        self.gateway
            .list_public_personas()
            .await
            .map_err(|e| load_error("public personas", e))
    }

    pub async fn get_persona(&self, persona_id: &str) -> Result<Persona> {
        self.gateway
            .get_persona(persona_id)
            .await
            .map_err(|e| load_error("persona", e))
    }

    /// Validates and saves a new persona
    pub async fn create_persona(&self, draft: &PersonaDraft) -> Result<Persona> {
        draft.validate()?;
        let persona = self.gateway.create_persona(self.ctx.user_id(), draft).await?;
        tracing::info!(persona_id = %persona.id, name = %persona.name(), "Created persona");
        Ok(persona)
    }

    /// Validates and saves changes to a persona
    pub async fn update_persona(&self, persona_id: &str, draft: &PersonaDraft) -> Result<Persona> {
        draft.validate()?;
        self.gateway.update_persona(persona_id, draft).await
    }

    pub async fn delete_persona(&self, persona_id: &str) -> Result<()> {
        self.gateway.delete_persona(persona_id).await?;
        tracing::info!(persona_id, "Deleted persona");
        Ok(())
    }

    /// Records something a persona has learned
    pub async fn learn(
        &self,
        persona_id: &str,
        category: &str,
        key: &str,
        value: &str,
    ) -> Result<KnowledgeEntry> {
        if key.trim().is_empty() || value.trim().is_empty() {
            return Err(
                EmrysError::Validation("Knowledge key and value are required".to_string()).into(),
            );
        }
        let category = match category.trim() {
            "" => "fact",
            other => other,
        };
        let entry = KnowledgeEntry::new(persona_id, category, key.trim(), value.trim());
        self.gateway.add_knowledge(&entry).await
    }

    /// A persona's knowledge, most recently learned first
    pub async fn knowledge(&self, persona_id: &str) -> Result<Vec<KnowledgeEntry>> {
        self.gateway
            .list_knowledge(persona_id)
            .await
            .map_err(|e| load_error("knowledge", e))
    }

    /// The user's hubs with rosters, newest first
    pub async fn list_hubs(&self) -> Result<Vec<Group>> {
        self.gateway
            .list_groups(self.ctx.user_id())
            .await
            .map_err(|e| load_error("hubs", e))
    }

    pub async fn get_hub(&self, group_id: &str) -> Result<Group> {
        self.gateway
            .get_group(group_id)
            .await
            .map_err(|e| load_error("hub", e))
    }

    /// Creates a hub from at least two distinct personas
    ///
    /// # Errors
    ///
    /// Returns [`EmrysError::Validation`] when the name is blank or fewer than
    /// two distinct personas are given; nothing is written in that case.
    pub async fn create_hub(&self, draft: &GroupDraft, persona_ids: &[String]) -> Result<Group> {
        let persona_ids = dedup_ids(persona_ids);
        draft.validate(&persona_ids)?;
        let draft = GroupDraft {
            name: draft.name.trim().to_string(),
            description: draft
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        };
        let group = self
            .gateway
            .create_group(self.ctx.user_id(), &draft, &persona_ids)
            .await?;
        tracing::info!(hub_id = %group.id, members = persona_ids.len(), "Created hub");
        Ok(group)
    }

    /// Links more personas to a hub, skipping ones already linked
    pub async fn add_hub_members(&self, group_id: &str, persona_ids: &[String]) -> Result<Group> {
        let group = self.get_hub(group_id).await?;
        let new_ids: Vec<String> = dedup_ids(persona_ids)
            .into_iter()
            .filter(|id| !group.group_members.iter().any(|m| &m.persona_id == id))
            .collect();
        if new_ids.is_empty() {
            return Err(EmrysError::Validation(
                "Select at least one new persona to add".to_string(),
            )
            .into());
        }
        self.gateway.add_group_members(group_id, &new_ids).await?;
        self.get_hub(group_id).await
    }

    pub async fn remove_hub_member(&self, group_id: &str, persona_id: &str) -> Result<Group> {
        self.gateway.remove_group_member(group_id, persona_id).await?;
        self.get_hub(group_id).await
    }

    pub async fn delete_hub(&self, group_id: &str) -> Result<()> {
        self.gateway.delete_group(group_id).await?;
        tracing::info!(hub_id = group_id, "Deleted hub");
        Ok(())
    }

    /// Drafts a persona profile from a name
    ///
    /// The returned draft is not saved. Only profile attributes from the
    /// backend are taken; see [`PersonaDraft::merge_synthesized`].
    ///
    /// # Errors
    ///
    /// [`EmrysError::Validation`] for a blank name,
    /// [`EmrysError::MissingCredential`] when no key is stored (the backend
    /// is not contacted), or the inference error.
    pub async fn synthesize(&self, name: &str, context: Option<&str>) -> Result<PersonaDraft> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EmrysError::Validation(
                "Please enter a name to synthesize an identity.".to_string(),
            )
            .into());
        }
        let api_key = ApiKey::new(self.ctx.inference_key()?);

        tracing::info!(name, "Synthesizing persona");
        let synthesized = self
            .inference
            .synthesize_persona(&SynthesisRequest {
                name: name.to_string(),
                context: context
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                api_key,
            })
            .await?;

        let mut draft = PersonaDraft::named(name);
        draft.merge_synthesized(&synthesized)?;
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MemoryCredentialStore;
    use crate::gateway::MemoryGateway;
    use crate::inference::{
        ChatOutcome, ChatRequest, GroupChatRequest, GroupOutcome, Reflection, ReflectionRequest,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct SynthOnly {
        requests: Mutex<Vec<SynthesisRequest>>,
    }

    #[async_trait]
    impl InferenceClient for SynthOnly {
        async fn send_chat(&self, _request: &ChatRequest) -> Result<ChatOutcome> {
            unimplemented!()
        }

        async fn send_group(&self, _request: &GroupChatRequest) -> Result<GroupOutcome> {
            unimplemented!()
        }

        async fn synthesize_persona(&self, request: &SynthesisRequest) -> Result<serde_json::Value> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(json!({
                "name": "Marie Curie",
                "occupation": "Physicist",
                "age": 66,
                "values": ["rigor"],
                "is_public": true
            }))
        }

        async fn reflect(&self, _request: &ReflectionRequest) -> Result<Reflection> {
            unimplemented!()
        }
    }

    fn service(key: Option<&str>) -> (RosterService, Arc<MemoryGateway>, Arc<SynthOnly>) {
        let gateway = Arc::new(MemoryGateway::new());
        let inference = Arc::new(SynthOnly::default());
        let credentials = match key {
            Some(key) => MemoryCredentialStore::with_key(key),
            None => MemoryCredentialStore::new(),
        };
        let ctx = SessionContext::new("u1", Arc::new(credentials));
        (
            RosterService::new(ctx, gateway.clone(), inference.clone()),
            gateway,
            inference,
        )
    }

    fn validation_message(err: &anyhow::Error) -> String {
        match err.downcast_ref::<EmrysError>() {
            Some(EmrysError::Validation(message)) => message.clone(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_persona_requires_name() {
        let (roster, _, _) = service(None);
        let err = roster
            .create_persona(&PersonaDraft::named(""))
            .await
            .unwrap_err();
        assert_eq!(validation_message(&err), "Name is required");
        assert!(roster.list_personas().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_hub_requires_name_and_two_personas() {
        let (roster, _, _) = service(None);
        let ada = roster
            .create_persona(&PersonaDraft::named("Ada"))
            .await
            .unwrap();
        let grace = roster
            .create_persona(&PersonaDraft::named("Grace"))
            .await
            .unwrap();

        let unnamed = GroupDraft::default();
        let err = roster
            .create_hub(&unnamed, &[ada.id.clone(), grace.id.clone()])
            .await
            .unwrap_err();
        assert_eq!(validation_message(&err), "Group name is required");

        let named = GroupDraft {
            name: "  Council ".to_string(),
            description: Some("   ".to_string()),
        };
        let err = roster
            .create_hub(&named, &[ada.id.clone(), ada.id.clone()])
            .await
            .unwrap_err();
        assert_eq!(
            validation_message(&err),
            "Select at least 2 personas to form a hub"
        );
        assert!(roster.list_hubs().await.unwrap().is_empty());

        let hub = roster
            .create_hub(&named, &[ada.id.clone(), grace.id.clone()])
            .await
            .unwrap();
        assert_eq!(hub.name, "Council");
        assert!(hub.description.is_none());
        assert_eq!(hub.personas().len(), 2);
    }

    #[tokio::test]
    async fn test_add_members_skips_existing() {
        let (roster, _, _) = service(None);
        let mut ids = Vec::new();
        for name in ["Ada", "Grace", "Marie"] {
            ids.push(
                roster
                    .create_persona(&PersonaDraft::named(name))
                    .await
                    .unwrap()
                    .id,
            );
        }
        let hub = roster
            .create_hub(
                &GroupDraft {
                    name: "Council".to_string(),
                    description: None,
                },
                &ids[..2],
            )
            .await
            .unwrap();

        let err = roster
            .add_hub_members(&hub.id, &[ids[0].clone()])
            .await
            .unwrap_err();
        assert!(validation_message(&err).contains("at least one"));

        let hub = roster
            .add_hub_members(&hub.id, &[ids[0].clone(), ids[2].clone()])
            .await
            .unwrap();
        assert_eq!(hub.personas().len(), 3);

        let hub = roster.remove_hub_member(&hub.id, &ids[1]).await.unwrap();
        assert_eq!(hub.personas().len(), 2);
    }

    #[tokio::test]
    async fn test_synthesize_merges_profile_into_draft() {
        let (roster, _, inference) = service(Some("sk-test"));
        let draft = roster
            .synthesize(" Marie Curie ", Some("  "))
            .await
            .unwrap();
        assert_eq!(draft.name, "Marie Curie");
        assert_eq!(draft.occupation.as_deref(), Some("Physicist"));
        assert_eq!(draft.age, Some(66));
        assert!(!draft.is_public);

        let requests = inference.requests.lock().unwrap();
        assert_eq!(requests[0].name, "Marie Curie");
        assert!(requests[0].context.is_none());
    }

    #[tokio::test]
    async fn test_synthesize_validates_before_credential() {
        let (roster, _, inference) = service(None);
        let err = roster.synthesize("  ", None).await.unwrap_err();
        assert_eq!(
            validation_message(&err),
            "Please enter a name to synthesize an identity."
        );

        let err = roster.synthesize("Ada", None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EmrysError>(),
            Some(EmrysError::MissingCredential)
        ));
        assert!(inference.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_learn_and_list_knowledge() {
        let (roster, _, _) = service(None);
        let ada = roster
            .create_persona(&PersonaDraft::named("Ada"))
            .await
            .unwrap();

        assert!(roster.learn(&ada.id, "fact", "", "x").await.is_err());

        roster
            .learn(&ada.id, "", "favourite engine", "Analytical")
            .await
            .unwrap();
        roster
            .learn(&ada.id, "preference", "tea", "Earl Grey")
            .await
            .unwrap();

        let knowledge = roster.knowledge(&ada.id).await.unwrap();
        assert_eq!(knowledge.len(), 2);
        assert_eq!(knowledge[0].key, "tea");
        assert_eq!(knowledge[1].category, "fact");
        assert_eq!(knowledge[1].source, "conversation");
    }

    #[tokio::test]
    async fn test_load_failures_are_load_errors() {
        let (roster, gateway, _) = service(None);
        gateway.fail_table("groups", "offline").await;
        let err = roster.list_hubs().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EmrysError>(),
            Some(EmrysError::Load(_))
        ));
    }

    #[test]
    fn test_dedup_ids_keeps_first_occurrence() {
        let ids = vec![
            "b".to_string(),
            "a".to_string(),
            " b ".to_string(),
            "".to_string(),
        ];
        assert_eq!(dedup_ids(&ids), vec!["b", "a"]);
    }
}
