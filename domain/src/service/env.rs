use std::collections::HashMap;

pub trait EnvLookup {
    fn get_env(&self, name: &str) -> Option<String>;
}

impl EnvLookup for HashMap<String, String> {
    fn get_env(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
