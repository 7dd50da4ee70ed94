pub mod asset_loader;
pub mod asset_resolver;
pub mod engine_bootstrap;
