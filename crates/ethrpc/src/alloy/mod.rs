pub mod errors;
mod instrumentation;

use {
    crate::AlloyProvider,
    alloy::{
        network::EthereumWallet,
        primitives::Address,
        providers::{Provider, ProviderBuilder},
        rpc::client::ClientBuilder,
        signers::local::PrivateKeySigner,
    },
    anyhow::{Context, Result},
    instrumentation::InstrumentationLayer,
    url::Url,
};

/// Creates a read-only provider for the node at `url`.
pub fn provider(url: &Url, label: &str) -> AlloyProvider {
    let rpc = ClientBuilder::default()
        .layer(InstrumentationLayer {
            label: label.into(),
        })
        .http(url.clone());
    ProviderBuilder::new().connect_client(rpc).erased()
}

/// Creates a provider that signs and sends transactions with `signer`.
/// Returns the provider together with the signer's address.
pub fn provider_with_signer(
    url: &Url,
    label: &str,
    signer: PrivateKeySigner,
) -> (AlloyProvider, Address) {
    let address = signer.address();
    let rpc = ClientBuilder::default()
        .layer(InstrumentationLayer {
            label: label.into(),
        })
        .http(url.clone());
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::new(signer))
        .connect_client(rpc)
        .erased();
    (provider, address)
}

/// Parses a hex encoded private key, with or without `0x` prefix.
pub fn parse_signer(private_key: &str) -> Result<PrivateKeySigner> {
    private_key
        .trim()
        .parse::<PrivateKeySigner>()
        .context("invalid private key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_private_keys() {
        // Well known first anvil account.
        let signer =
            parse_signer("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
                .unwrap();
        assert_eq!(
            signer.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
        assert!(parse_signer("not a key").is_err());
    }

    #[tokio::test]
    async fn provider_construction_is_lazy() {
        // No request is issued until the provider is used.
        let url = Url::parse("http://localhost:1").unwrap();
        let _provider = provider(&url, "test");
        let (_provider, _address) = provider_with_signer(
            &url,
            "test",
            parse_signer("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
                .unwrap(),
        );
    }
}
