use anyhow::Result;
use tracing::{error, info, warn};

use super::dispatch::split_text_into_chunks;
use super::role_names::RoleNameLookup;
use super::table::{split_group_tag, InsertOutcome, RoutingEntry};
use super::Router;

/// Channel-safe name: lowercase, brackets and whitespace become hyphens,
/// hyphen runs collapse, no leading or trailing hyphen
pub fn channel_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        let ch = if ch == '[' || ch == ']' || ch.is_whitespace() {
            '-'
        } else {
            ch
        };
        if ch == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(ch);
    }
    slug.trim_matches('-').to_string()
}

impl Router {
    /// Give an unrouted role a destination channel.
    ///
    /// Returns `Ok(None)` when the role stays unresolved; the media is then
    /// written to the log channel so nothing is dropped silently.
    pub(super) async fn resolve_unknown_role(
        &self,
        role_id: &str,
        media: &[String],
    ) -> Result<Option<RoutingEntry>> {
        let _guard = self.provisioning.lock().await;

        // Another message may have provisioned this role while we waited
        if let Some((_, entry)) = self.table.read().await.lookup(role_id) {
            return Ok(Some(entry.clone()));
        }

        let display_name = match self.role_names.lookup(role_id).await {
            RoleNameLookup::Found(name) => name,
            RoleNameLookup::NotReady => {
                warn!("Role name cache queried before it was built (role {})", role_id);
                self.log_unresolved(
                    &format!(
                        "Role name cache not built yet; cannot resolve role ID: {}",
                        role_id
                    ),
                    media,
                )
                .await;
                return Ok(None);
            }
            RoleNameLookup::Missing => {
                self.log_unresolved(&format!("No member found for role ID: {}", role_id), media)
                    .await;
                return Ok(None);
            }
        };

        let (name, group) = split_group_tag(&display_name);
        let slug = channel_slug(&name);
        if slug.is_empty() {
            self.log_unresolved(
                &format!(
                    "Cannot derive a channel name from '{}' (role ID: {})",
                    display_name, role_id
                ),
                media,
            )
            .await;
            return Ok(None);
        }

        let guild_id = self.settings.guild_id;
        match self.platform.guild_exists(guild_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.log_unresolved(
                    &format!(
                        "Guild ID {} not found; cannot create a channel for role ID: {}",
                        guild_id, role_id
                    ),
                    media,
                )
                .await;
                return Ok(None);
            }
            Err(e) => {
                error!("Guild lookup for role {} failed: {:#}", role_id, e);
                self.log_unresolved(
                    &format!(
                        "Failed to look up guild {} for {} (role ID: {}): {:#}",
                        guild_id, display_name, role_id, e
                    ),
                    media,
                )
                .await;
                return Ok(None);
            }
        }

        let reason = format!("Auto-created for role {} ({})", display_name, role_id);
        let channel_id = match self
            .platform
            .create_text_channel(guild_id, &slug, self.settings.category_id, &reason)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!("Channel creation for role {} failed: {:#}", role_id, e);
                self.log_unresolved(
                    &format!(
                        "Failed to create channel for {} (role ID: {}): {:#}",
                        display_name, role_id, e
                    ),
                    media,
                )
                .await;
                return Ok(None);
            }
        };

        let entry = RoutingEntry {
            role_id: role_id.to_string(),
            channel_id: channel_id.to_string(),
            group,
        };
        let outcome = self.table.write().await.insert(&name, entry.clone());
        if outcome == InsertOutcome::MergedIntoGroup {
            info!("Role {} joined existing name '{}' as a group entry", role_id, name);
        }

        self.persist_table().await;
        self.ops
            .post(&format!(
                "Created #{} for {} (role ID: {})",
                slug, display_name, role_id
            ))
            .await;

        Ok(Some(entry))
    }

    /// Rewrite the routing document. Failures leave memory ahead of disk
    /// until the next successful write.
    async fn persist_table(&self) {
        let snapshot = self.table.read().await.clone();
        if let Err(e) = self.store.save(&snapshot).await {
            self.ops.post_error(&e).await;
        }
    }

    async fn log_unresolved(&self, headline: &str, media: &[String]) {
        let mut text = headline.to_string();
        if !media.is_empty() {
            text.push_str("\nMedia:\n");
            text.push_str(&media.join("\n"));
        }
        for chunk in split_text_into_chunks(&text, self.settings.log_chunk_size) {
            self.ops.post(&chunk).await;
        }
    }
}
