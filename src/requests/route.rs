//! Route templates and their compilation into concrete paths and bucket keys.

use std::collections::HashMap;
use std::fmt;

use crate::error::{ClientError, Result};

/// Parameters the remote rate limiter partitions quota by
const MAJOR_PARAMETERS: &[&str] = &["channel_id", "guild_id", "webhook_id", "interaction_token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An endpoint template such as `/channels/{channel_id}/messages`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: &'static str,
}

impl Route {
    pub const fn new(method: Method, template: &'static str) -> Self {
        Self { method, template }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    /// Placeholder names in template order
    pub fn parameters(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut rest = self.template;
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        names
    }

    /// Substitute `params` into the template.
    ///
    /// The bucket key keeps minor parameters as placeholders and substitutes major
    /// ones, so two routes sharing a template and major ids share quota.
    pub fn compile(&self, params: &[(&str, &str)]) -> Result<CompiledRoute> {
        let values: HashMap<&str, &str> = params.iter().copied().collect();
        let names = self.parameters();

        if let Some((unexpected, _)) = params
            .iter()
            .find(|(name, _)| !names.iter().any(|n| *n == *name))
        {
            return Err(ClientError::invalid_parameter(
                *unexpected,
                format!("not a parameter of {}", self.template),
            ));
        }

        let mut path = self.template.to_string();
        let mut bucket = self.template.to_string();
        for name in names {
            let value = values.get(name).ok_or_else(|| {
                ClientError::invalid_parameter(name, format!("missing for {}", self.template))
            })?;
            if name.ends_with("_id") {
                check_snowflake(name, value)?;
            } else if value.is_empty() {
                return Err(ClientError::invalid_parameter(name, "must not be empty"));
            }

            let placeholder = format!("{{{}}}", name);
            let encoded = urlencoding::encode(value);
            path = path.replacen(&placeholder, &encoded, 1);
            if MAJOR_PARAMETERS.contains(&name) {
                bucket = bucket.replacen(&placeholder, &encoded, 1);
            }
        }

        Ok(CompiledRoute {
            method: self.method,
            template: self.template,
            bucket_key: format!("{} {}", self.method, bucket),
            path,
        })
    }
}

/// A route with every parameter filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRoute {
    method: Method,
    template: &'static str,
    path: String,
    bucket_key: String,
}

impl CompiledRoute {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bucket_key(&self) -> &str {
        &self.bucket_key
    }
}

impl fmt::Display for CompiledRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Validate a 64-bit numeric id given as a string
pub fn check_snowflake(name: &str, value: &str) -> Result<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ClientError::invalid_parameter(
            name,
            format!("'{}' is not a snowflake", value),
        ));
    }
    value.parse::<u64>().map_err(|_| {
        ClientError::invalid_parameter(name, format!("'{}' does not fit in 64 bits", value))
    })
}

pub mod channels {
    use super::{Method, Route};

    pub const CREATE_MESSAGE: Route = Route::new(Method::Post, "/channels/{channel_id}/messages");
    pub const CROSSPOST_MESSAGE: Route =
        Route::new(Method::Post, "/channels/{channel_id}/messages/{message_id}/crosspost");
    pub const FOLLOW_NEWS_CHANNEL: Route = Route::new(Method::Post, "/channels/{channel_id}/followers");
    pub const MODIFY_PERM_OVERRIDE: Route =
        Route::new(Method::Put, "/channels/{channel_id}/permissions/{override_id}");
    pub const DELETE_PERM_OVERRIDE: Route =
        Route::new(Method::Delete, "/channels/{channel_id}/permissions/{override_id}");
}

pub mod guilds {
    use super::{Method, Route};

    pub const CREATE_CHANNEL: Route = Route::new(Method::Post, "/guilds/{guild_id}/channels");
}

pub mod interactions {
    use super::{Method, Route};

    pub const CREATE_COMMAND: Route = Route::new(Method::Post, "/applications/{application_id}/commands");
    pub const CREATE_GUILD_COMMAND: Route =
        Route::new(Method::Post, "/applications/{application_id}/guilds/{guild_id}/commands");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_crosspost() {
        let route = channels::CROSSPOST_MESSAGE
            .compile(&[("channel_id", "100"), ("message_id", "555")])
            .unwrap();
        assert_eq!(route.method(), Method::Post);
        assert_eq!(route.path(), "/channels/100/messages/555/crosspost");
        assert_eq!(
            route.bucket_key(),
            "POST /channels/100/messages/{message_id}/crosspost"
        );
    }

    #[test]
    fn test_minor_parameters_share_bucket() {
        let a = channels::DELETE_PERM_OVERRIDE
            .compile(&[("channel_id", "1"), ("override_id", "2")])
            .unwrap();
        let b = channels::DELETE_PERM_OVERRIDE
            .compile(&[("override_id", "3"), ("channel_id", "1")])
            .unwrap();
        let other_channel = channels::DELETE_PERM_OVERRIDE
            .compile(&[("channel_id", "9"), ("override_id", "2")])
            .unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(a.bucket_key(), b.bucket_key());
        assert_ne!(a.bucket_key(), other_channel.bucket_key());
    }

    #[test]
    fn test_method_is_part_of_bucket() {
        let put = channels::MODIFY_PERM_OVERRIDE
            .compile(&[("channel_id", "1"), ("override_id", "2")])
            .unwrap();
        let delete = channels::DELETE_PERM_OVERRIDE
            .compile(&[("channel_id", "1"), ("override_id", "2")])
            .unwrap();
        assert_eq!(put.path(), delete.path());
        assert_ne!(put.bucket_key(), delete.bucket_key());
    }

    #[test]
    fn test_missing_and_malformed_parameters() {
        let missing = channels::CROSSPOST_MESSAGE.compile(&[("channel_id", "100")]);
        assert!(matches!(
            missing,
            Err(ClientError::InvalidParameter { ref name, .. }) if name == "message_id"
        ));

        let malformed = channels::CROSSPOST_MESSAGE.compile(&[("channel_id", "abc"), ("message_id", "1")]);
        assert!(matches!(malformed, Err(ClientError::InvalidParameter { .. })));

        let overflow = check_snowflake("id", "99999999999999999999999");
        assert!(overflow.is_err());

        let unexpected = guilds::CREATE_CHANNEL.compile(&[("guild_id", "1"), ("channel_id", "2")]);
        assert!(unexpected.is_err());
    }

    #[test]
    fn test_parameters_in_order() {
        assert_eq!(
            interactions::CREATE_GUILD_COMMAND.parameters(),
            vec!["application_id", "guild_id"]
        );
    }
}
