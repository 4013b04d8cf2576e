//! PostgREST-style persistence gateway
//!
//! Talks to the hosted table API under `<url>/rest/v1`. Filters use the
//! `column=eq.value` query convention, embedded joins use the `select`
//! parameter, and writes ask for `Prefer: return=representation` so inserted
//! rows come back in the response.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::{EmrysError, Result};
use crate::gateway::{PersistenceGateway, FEED_PAGE_SIZE};
use crate::models::{
    Conversation, ConversationTarget, Group, GroupDraft, KnowledgeEntry, Message, NewMessage,
    NewPost, Persona, PersonaDraft, PersonaPost,
};

const GROUP_SELECT: &str = "*,group_members(persona_id,personas(*))";
const POST_SELECT: &str = "*,personas(name,avatar_url,occupation)";

/// Query pairs for one request
type Query = Vec<(&'static str, String)>;

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// HTTP client for the hosted table API
///
/// # Examples
///
/// ```
/// use emrys::config::GatewayConfig;
/// use emrys::gateway::RestGateway;
///
/// let gateway = RestGateway::new(&GatewayConfig::default());
/// assert!(gateway.is_ok());
/// ```
pub struct RestGateway {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

#[derive(Serialize)]
struct PersonaInsert<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    draft: &'a PersonaDraft,
}

#[derive(Serialize)]
struct GroupInsert<'a> {
    user_id: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct MemberInsert<'a> {
    group_id: &'a str,
    persona_id: &'a str,
}

#[derive(Serialize)]
struct ConversationInsert<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    persona_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct UseCountRow {
    #[serde(default)]
    use_count: u64,
}

impl RestGateway {
    /// Create a gateway client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("emrys/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmrysError::Gateway(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str, query: &Query) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, path);
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .query(query)
    }

    async fn execute(&self, what: &str, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await.map_err(|e| {
            tracing::error!("Gateway request {} failed: {}", what, e);
            EmrysError::Gateway(format!("{} failed: {}", what, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gateway {} returned {}: {}", what, status, body);
            return Err(
                EmrysError::Gateway(format!("{} returned {}: {}", what, status, body)).into(),
            );
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(what: &str, response: reqwest::Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            tracing::error!("Failed to parse gateway response for {}: {}", what, e);
            EmrysError::Gateway(format!("{}: unexpected response: {}", what, e)).into()
        })
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: Query) -> Result<Vec<T>> {
        let what = format!("select {}", table);
        tracing::debug!(table, ?query, "Gateway select");
        let response = self
            .execute(&what, self.request(Method::GET, table, &query))
            .await?;
        Self::decode(&what, response).await
    }

    async fn select_one<T: DeserializeOwned>(&self, table: &str, query: Query) -> Result<T> {
        self.select(table, query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmrysError::Gateway(format!("{}: no matching row", table)).into())
    }

    async fn write<B, T>(
        &self,
        method: Method,
        table: &str,
        query: Query,
        body: &B,
    ) -> Result<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let what = format!("{} {}", method, table);
        tracing::debug!(table, %method, "Gateway write");
        let builder = self
            .request(method, table, &query)
            .header("Prefer", "return=representation")
            .json(body);
        let response = self.execute(&what, builder).await?;
        Self::decode(&what, response).await
    }

    async fn insert_one<B, T>(&self, table: &str, query: Query, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.write::<B, T>(Method::POST, table, query, body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmrysError::Gateway(format!("insert {}: no row returned", table)).into())
    }

    async fn delete(&self, table: &str, query: Query) -> Result<()> {
        let what = format!("delete {}", table);
        tracing::debug!(table, ?query, "Gateway delete");
        self.execute(&what, self.request(Method::DELETE, table, &query))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for RestGateway {
    async fn list_personas(&self, user_id: &str) -> Result<Vec<Persona>> {
        self.select(
            "personas",
            vec![
                ("select", "*".to_string()),
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn list_public_personas(&self) -> Result<Vec<Persona>> {
        self.select(
            "personas",
            vec![
                ("select", "*".to_string()),
                ("is_public", "eq.true".to_string()),
                ("order", "use_count.desc".to_string()),
            ],
        )
        .await
    }

    async fn get_persona(&self, persona_id: &str) -> Result<Persona> {
        self.select_one(
            "personas",
            vec![("select", "*".to_string()), ("id", eq(persona_id))],
        )
        .await
    }

    async fn create_persona(&self, user_id: &str, draft: &PersonaDraft) -> Result<Persona> {
        self.insert_one("personas", vec![], &[PersonaInsert { user_id, draft }])
            .await
    }

    async fn update_persona(&self, persona_id: &str, draft: &PersonaDraft) -> Result<Persona> {
        self.write::<_, Persona>(Method::PATCH, "personas", vec![("id", eq(persona_id))], draft)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmrysError::Gateway(format!("persona {} not found", persona_id)).into())
    }

    async fn delete_persona(&self, persona_id: &str) -> Result<()> {
        self.delete("personas", vec![("id", eq(persona_id))]).await
    }

    async fn increment_use_count(&self, persona_id: &str) -> Result<()> {
        let rpc = self
            .request(Method::POST, "rpc/increment_persona_use", &vec![])
            .json(&serde_json::json!({ "persona_id": persona_id }));
        if self.execute("rpc increment_persona_use", rpc).await.is_ok() {
            return Ok(());
        }

        tracing::debug!("increment_persona_use RPC unavailable, falling back to update");
        let row: UseCountRow = self
            .select_one(
                "personas",
                vec![("select", "use_count".to_string()), ("id", eq(persona_id))],
            )
            .await?;
        let _: Vec<serde_json::Value> = self
            .write(
                Method::PATCH,
                "personas",
                vec![("id", eq(persona_id))],
                &serde_json::json!({ "use_count": row.use_count + 1 }),
            )
            .await?;
        Ok(())
    }

    async fn list_groups(&self, user_id: &str) -> Result<Vec<Group>> {
        self.select(
            "groups",
            vec![
                ("select", GROUP_SELECT.to_string()),
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn get_group(&self, group_id: &str) -> Result<Group> {
        self.select_one(
            "groups",
            vec![("select", GROUP_SELECT.to_string()), ("id", eq(group_id))],
        )
        .await
    }

    async fn create_group(
        &self,
        user_id: &str,
        draft: &GroupDraft,
        persona_ids: &[String],
    ) -> Result<Group> {
        let group: Group = self
            .insert_one(
                "groups",
                vec![],
                &[GroupInsert {
                    user_id,
                    name: &draft.name,
                    description: draft.description.as_deref(),
                }],
            )
            .await?;

        self.add_group_members(&group.id, persona_ids).await?;
        self.get_group(&group.id).await
    }

    async fn add_group_members(&self, group_id: &str, persona_ids: &[String]) -> Result<()> {
        let rows: Vec<MemberInsert<'_>> = persona_ids
            .iter()
            .map(|persona_id| MemberInsert {
                group_id,
                persona_id,
            })
            .collect();
        let _: Vec<serde_json::Value> = self
            .write(Method::POST, "group_members", vec![], &rows)
            .await?;
        Ok(())
    }

    async fn remove_group_member(&self, group_id: &str, persona_id: &str) -> Result<()> {
        self.delete(
            "group_members",
            vec![("group_id", eq(group_id)), ("persona_id", eq(persona_id))],
        )
        .await
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        self.delete("groups", vec![("id", eq(group_id))]).await
    }

    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        target: &ConversationTarget,
    ) -> Result<Conversation> {
        let (column, id) = match target {
            ConversationTarget::Persona(id) => ("persona_id", id.as_str()),
            ConversationTarget::Group(id) => ("group_id", id.as_str()),
        };

        let existing: Vec<Conversation> = self
            .select(
                "conversations",
                vec![
                    ("select", "*".to_string()),
                    ("user_id", eq(user_id)),
                    (column, eq(id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        if let Some(conversation) = existing.into_iter().next() {
            return Ok(conversation);
        }

        tracing::info!(user_id, target = ?target, "Creating conversation");
        let insert = match target {
            ConversationTarget::Persona(_) => ConversationInsert {
                user_id,
                persona_id: Some(id),
                group_id: None,
            },
            ConversationTarget::Group(_) => ConversationInsert {
                user_id,
                persona_id: None,
                group_id: Some(id),
            },
        };
        self.insert_one("conversations", vec![], &[insert]).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.select(
            "messages",
            vec![
                ("select", "*".to_string()),
                ("conversation_id", eq(conversation_id)),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        self.insert_one("messages", vec![], std::slice::from_ref(message))
            .await
    }

    async fn clear_messages(&self, conversation_id: &str) -> Result<()> {
        self.delete("messages", vec![("conversation_id", eq(conversation_id))])
            .await
    }

    async fn list_posts(&self, user_id: &str) -> Result<Vec<PersonaPost>> {
        self.select(
            "persona_posts",
            vec![
                ("select", POST_SELECT.to_string()),
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
                ("limit", FEED_PAGE_SIZE.to_string()),
            ],
        )
        .await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<PersonaPost> {
        self.insert_one(
            "persona_posts",
            vec![("select", POST_SELECT.to_string())],
            std::slice::from_ref(post),
        )
        .await
    }

    async fn add_knowledge(&self, entry: &KnowledgeEntry) -> Result<KnowledgeEntry> {
        self.insert_one("persona_knowledge", vec![], std::slice::from_ref(entry))
            .await
    }

    async fn list_knowledge(&self, persona_id: &str) -> Result<Vec<KnowledgeEntry>> {
        self.select(
            "persona_knowledge",
            vec![
                ("select", "*".to_string()),
                ("persona_id", eq(persona_id)),
                ("order", "learned_at.desc".to_string()),
            ],
        )
        .await
    }
}
