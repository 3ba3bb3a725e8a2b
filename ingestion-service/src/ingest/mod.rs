//! Pure statement processing: parsing, categorization and record identity.

pub mod classifier;
pub mod convert;
pub mod identifier;
pub mod parser;

pub use classifier::{Classification, Classifier, KeywordClassifier};
pub use convert::{merchant_name, to_record, UPLOADED_ACCOUNT_ID};
pub use identifier::source_id;
pub use parser::{parse_statement, ParseError, ParsedRow, ParsedStatement};
