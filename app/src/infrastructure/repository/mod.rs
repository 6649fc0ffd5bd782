mod token;

pub use self::token::YamlTokenStore;
