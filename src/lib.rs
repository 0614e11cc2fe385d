pub mod config;
pub mod db;
pub mod enrich;
pub mod extract;
pub mod feed;
pub mod filter;
pub mod llm;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod prompts;

#[cfg(test)]
mod test_support;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DB: &str = "db_query";
