pub mod auth;
pub mod node_types;
pub mod output_parser;
pub mod pbs_script;
pub mod table;

pub mod prelude {
    #[rustfmt::skip]
    pub use super::{
        auth::{AuthSession, AuthSettings},
        node_types::NodeTypes,
        output_parser::{parse, parse_full_status, shapes, ParseOutcome},
        pbs_script::{ExecutionBlock, PbsScriptBuilder},
        table::Table,
    };
}
