pub mod bot;
pub mod category;
pub mod client;
pub mod config;
pub mod credentials;
pub mod download;
pub mod namespaces;
pub mod site;
pub mod spacing;
pub mod wikitext;
