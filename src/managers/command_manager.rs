use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::entities::{Command, EntityBuilder};
use crate::error::{ClientError, Result};
use crate::permissions::Permissions;
use crate::requests::route::interactions;
use crate::requests::{Action, PendingAction, SharedRequester};
use crate::state::SharedRegistry;

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_DESCRIPTION_LENGTH: usize = 100;

fn check_name(field: &str, name: &str) -> Result<()> {
    let length = name.chars().count();
    if length == 0 || length > MAX_NAME_LENGTH {
        return Err(ClientError::invalid_parameter(
            field,
            format!("must be 1 to {} characters, got {}", MAX_NAME_LENGTH, length),
        ));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ClientError::invalid_parameter(field, format!("'{}' contains whitespace", name)));
    }
    if name.chars().any(char::is_uppercase) {
        return Err(ClientError::invalid_parameter(field, format!("'{}' must be lowercase", name)));
    }
    Ok(())
}

fn check_description(field: &str, description: &str) -> Result<()> {
    let length = description.chars().count();
    if length == 0 || length > MAX_DESCRIPTION_LENGTH {
        return Err(ClientError::invalid_parameter(
            field,
            format!("must be 1 to {} characters, got {}", MAX_DESCRIPTION_LENGTH, length),
        ));
    }
    Ok(())
}

/// Builder for registering a chat-input command, globally or in one guild
pub struct CommandCreateAction {
    requester: SharedRequester,
    builder: EntityBuilder,
    application_id: u64,
    guild_id: Option<u64>,
    name: String,
    description: String,
    name_localizations: HashMap<String, String>,
    description_localizations: HashMap<String, String>,
    default_permissions: Option<Permissions>,
    guild_only: bool,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl CommandCreateAction {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name_localization(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.name_localizations.insert(locale.into(), name.into());
        self
    }

    pub fn name_localizations(mut self, map: HashMap<String, String>) -> Self {
        self.name_localizations.extend(map);
        self
    }

    pub fn description_localization(
        mut self,
        locale: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.description_localizations
            .insert(locale.into(), description.into());
        self
    }

    pub fn description_localizations(mut self, map: HashMap<String, String>) -> Self {
        self.description_localizations.extend(map);
        self
    }

    /// Permissions a member needs to see the command. Empty means admins only.
    pub fn default_permissions(mut self, permissions: Permissions) -> Self {
        self.default_permissions = Some(permissions);
        self
    }

    pub fn guild_only(mut self, guild_only: bool) -> Self {
        self.guild_only = guild_only;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check the parameters and turn the description into an action
    pub fn build(self) -> Result<Action<Command>> {
        check_name("name", &self.name)?;
        check_description("description", &self.description)?;
        for (locale, name) in &self.name_localizations {
            check_name(&format!("name_localizations.{}", locale), name)?;
        }
        for (locale, description) in &self.description_localizations {
            check_description(&format!("description_localizations.{}", locale), description)?;
        }

        let application_id = self.application_id.to_string();
        let route = match self.guild_id {
            Some(guild_id) => interactions::CREATE_GUILD_COMMAND.compile(&[
                ("application_id", application_id.as_str()),
                ("guild_id", guild_id.to_string().as_str()),
            ])?,
            None => interactions::CREATE_COMMAND
                .compile(&[("application_id", application_id.as_str())])?,
        };

        let mut body = json!({
            "type": 1,
            "name": self.name,
            "description": self.description,
            "dm_permission": !self.guild_only,
            "default_member_permissions": self.default_permissions.map(|p| p.bits().to_string()),
        });
        if !self.name_localizations.is_empty() {
            body["name_localizations"] = json!(self.name_localizations);
        }
        if !self.description_localizations.is_empty() {
            body["description_localizations"] = json!(self.description_localizations);
        }

        let builder = self.builder;
        let mut action = self
            .requester
            .action(route, move |json| builder.create_command(json))
            .body(body);
        if let Some(deadline) = self.deadline {
            action = action.deadline(deadline);
        }
        if let Some(timeout) = self.timeout {
            action = action.timeout(timeout);
        }
        Ok(action)
    }

    pub fn submit(self) -> Result<PendingAction<Command>> {
        self.build()?.submit()
    }

    pub async fn complete(self) -> Result<Command> {
        self.build()?.complete().await
    }
}

/// Registers application commands
pub struct CommandManager {
    requester: SharedRequester,
    builder: EntityBuilder,
    application_id: u64,
}

impl CommandManager {
    pub fn new(registry: SharedRegistry, requester: SharedRequester, application_id: u64) -> Self {
        Self {
            builder: EntityBuilder::new(registry),
            requester,
            application_id,
        }
    }

    fn create(&self, guild_id: Option<u64>, name: &str, description: &str) -> CommandCreateAction {
        CommandCreateAction {
            requester: Arc::clone(&self.requester),
            builder: self.builder.clone(),
            application_id: self.application_id,
            guild_id,
            name: name.to_string(),
            description: description.to_string(),
            name_localizations: HashMap::new(),
            description_localizations: HashMap::new(),
            default_permissions: None,
            guild_only: guild_id.is_some(),
            deadline: None,
            timeout: None,
        }
    }

    pub fn create_command(&self, name: &str, description: &str) -> CommandCreateAction {
        self.create(None, name, description)
    }

    pub fn create_guild_command(&self, guild_id: u64, name: &str, description: &str) -> CommandCreateAction {
        self.create(Some(guild_id), name, description)
    }
}

/// Shared command manager type
pub type SharedCommandManager = Arc<CommandManager>;

pub fn create_shared_command_manager(
    registry: SharedRegistry,
    requester: SharedRequester,
    application_id: u64,
) -> SharedCommandManager {
    Arc::new(CommandManager::new(registry, requester, application_id))
}
