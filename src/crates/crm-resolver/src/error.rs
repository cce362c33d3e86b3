use crm_gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no candidates matched the query")]
    NoMatches,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
