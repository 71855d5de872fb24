use alloy::{contract::Error as ContractError, transports::RpcError};

/// Why a contract interaction failed, as far as it matters to the user: a
/// node problem is worth retrying later, a revert is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFailure {
    /// The node could not be reached or refused the request.
    Node,
    /// The contract executed and reverted.
    Reverted,
}

pub trait ContractErrorExt {
    /// Returns whether a given error is a contract error, this is considered to
    /// be all errors except the transport error where there is no revert data.
    fn is_contract_error(&self) -> bool;

    /// Returns whether a given error is a node error.
    fn is_node_error(&self) -> bool;

    fn classify(&self) -> CallFailure {
        if self.is_node_error() {
            CallFailure::Node
        } else {
            CallFailure::Reverted
        }
    }
}

impl ContractErrorExt for ContractError {
    fn is_contract_error(&self) -> bool {
        !self.is_node_error()
    }

    fn is_node_error(&self) -> bool {
        // Some reverts reach us as JSON-RPC error responses. Only the presence
        // of revert data tells them apart from genuine node failures, and the
        // revert data may be empty (e.g. calling a missing function), so
        // alloy's decoding helpers can't be used here.
        match self {
            ContractError::TransportError(RpcError::ErrorResp(err)) => {
                let no_revert_data = err.as_revert_data().is_none();
                tracing::debug!(?err, %no_revert_data, "transport rpc error");
                no_revert_data
            }
            ContractError::TransportError(_) => true,
            _ => false,
        }
    }
}

/// Create an arbitrary alloy error that will convert into a "contract" error.
/// Useful for testing.
#[cfg(test)]
pub fn testing_alloy_contract_error() -> ContractError {
    ContractError::NotADeploymentTransaction
}

/// Create an arbitrary alloy error that will convert into a "node" error.
/// Useful for testing.
#[cfg(test)]
pub fn testing_alloy_node_error() -> ContractError {
    ContractError::TransportError(alloy::transports::TransportError::ErrorResp(
        alloy::rpc::json_rpc::ErrorPayload::internal_error(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_contract_errors() {
        assert!(testing_alloy_contract_error().is_contract_error());
        assert_eq!(
            testing_alloy_contract_error().classify(),
            CallFailure::Reverted
        );
    }

    #[test]
    fn classifies_node_errors() {
        assert!(testing_alloy_node_error().is_node_error());
        assert_eq!(testing_alloy_node_error().classify(), CallFailure::Node);
    }
}
