use serde::{Deserialize, Deserializer};

/// Envelope of the `exec` and `putfile` endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Reply {
    #[serde(default, deserialize_with = "flag")]
    success: Option<bool>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl Reply {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.success == Some(true)
    }

    /// Only an explicit `"false"` counts; `putfile` may omit the flag.
    #[inline]
    pub fn is_failure(&self) -> bool {
        self.success == Some(false)
    }

    /// Error text the service reported, falling back to stderr.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(error) if !error.is_empty() => error.clone(),
            _ => self.stderr.clone(),
        }
    }
}

/// UIT+ reports `"true"`/`"false"` strings, but plain booleans show up too.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => Some(b),
        Some(Flag::Text(s)) => Some(s.eq_ignore_ascii_case("true")),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::Reply;

    #[test]
    fn success_flag_forms() {
        let reply: Reply = serde_json::from_str(r#"{"success": "true", "stdout": "ok\n"}"#).unwrap();
        assert!(reply.is_ok());
        assert_eq!("ok\n", reply.stdout);

        let reply: Reply = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(reply.is_ok());

        let reply: Reply =
            serde_json::from_str(r#"{"success": "false", "stderr": "no such file"}"#).unwrap();
        assert!(!reply.is_ok());
        assert!(reply.is_failure());
        assert_eq!("no such file", reply.error_message());

        let reply: Reply = serde_json::from_str("{}").unwrap();
        assert!(!reply.is_ok());
        assert!(!reply.is_failure());

        let reply: Reply =
            serde_json::from_str(r#"{"success": "false", "error": "DP Route error"}"#).unwrap();
        assert_eq!("DP Route error", reply.error_message());
    }
}
