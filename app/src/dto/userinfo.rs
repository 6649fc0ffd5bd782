use std::collections::BTreeMap;

use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct UserInfoReply {
    #[serde(default)]
    pub success: serde_json::Value,
    pub userinfo: Option<UserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub systems: BTreeMap<String, SystemInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct SystemInfo {
    /// Account name on this system, may differ from the UIT+ user name.
    pub username: Option<String>,
    #[serde(default)]
    pub login_nodes: Vec<LoginNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct LoginNode {
    pub hostname: String,
    pub urls: NodeUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeUrls {
    #[serde(rename = "UIT")]
    pub uit: Url,
}

impl LoginNode {
    /// `narwhal01.navydsrc.hpc.mil` -> `narwhal01`
    pub fn name(&self) -> &str {
        self.hostname.split('.').next().unwrap_or(&self.hostname)
    }
}

impl UserInfo {
    /// Lower-cased, sorted system names.
    pub fn systems(&self) -> Vec<String> {
        self.systems.keys().map(|s| s.to_lowercase()).collect()
    }

    pub fn system(&self, name: &str) -> Option<&SystemInfo> {
        self.systems
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// The system a login node belongs to.
    pub fn system_of(&self, node: &str) -> Option<(String, &LoginNode)> {
        self.systems.iter().find_map(|(system, info)| {
            info.login_nodes
                .iter()
                .find(|n| n.name() == node)
                .map(|n| (system.to_lowercase(), n))
        })
    }
}

impl UserInfoReply {
    pub fn is_ok(&self) -> bool {
        match &self.success {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => self.userinfo.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::UserInfoReply;

    const USERINFO: &str = indoc! {r#"
        {
          "success": true,
          "userinfo": {
            "USERNAME": "jdoe",
            "SYSTEMS": {
              "NARWHAL": {
                "USERNAME": "jdoe_n",
                "LOGIN_NODES": [
                  {"HOSTNAME": "narwhal01.navydsrc.hpc.mil", "URLS": {"UIT": "https://uit.example/n01/"}},
                  {"HOSTNAME": "narwhal02.navydsrc.hpc.mil", "URLS": {"UIT": "https://uit.example/n02/"}}
                ]
              },
              "ONYX": {"LOGIN_NODES": []}
            }
          }
        }
    "#};

    #[test]
    fn systems_and_nodes() {
        let reply: UserInfoReply = serde_json::from_str(USERINFO).unwrap();
        assert!(reply.is_ok());
        let info = reply.userinfo.unwrap();
        assert_eq!("jdoe", info.username);
        assert_eq!(vec!["narwhal", "onyx"], info.systems());

        let narwhal = info.system("narwhal").unwrap();
        assert_eq!(Some("jdoe_n"), narwhal.username.as_deref());
        assert_eq!("narwhal02", narwhal.login_nodes[1].name());

        let (system, node) = info.system_of("narwhal01").unwrap();
        assert_eq!("narwhal", system);
        assert_eq!("https://uit.example/n01/", node.urls.uit.as_str());
        assert!(info.system_of("onyx01").is_none());
    }
}
