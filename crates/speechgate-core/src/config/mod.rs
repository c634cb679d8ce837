pub mod parser;
pub mod schema;
pub mod validator;

pub use parser::{
    CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, load_config, parse_yaml_file, parse_yaml_str,
    resolve_config_path,
};
pub use schema::*;
pub use validator::{validate_config, validate_models, validate_server};
