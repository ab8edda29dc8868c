// Application configuration
pub mod config;

// Declarative connector and endpoint configuration
pub mod connector;

// Connection lifecycle and persistence
pub mod connection;

// Credential records and encrypted token storage
pub mod credentials;

// OAuth 2.0 authorization-code flow
pub mod oauth;

// Authenticated request proxy
pub mod proxy;

// Response normalization into canonical domain objects
pub mod normalize;

// HTTP API
pub mod api;
