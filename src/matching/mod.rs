pub mod email;
pub mod manager;
pub mod name;
pub mod similarity;
pub mod url;

pub use self::email::normalize_email;
pub use self::manager::{find_duplicate_groups, find_duplicate_groups_with_options, GroupingOptions, GroupingOutcome};
pub use self::name::{name_key, normalize_name};
pub use self::similarity::string_similarity;
pub use self::url::normalize_domain;
