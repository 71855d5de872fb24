pub use alloy::providers::DynProvider as Provider;

#[macro_export]
macro_rules! bindings {
    ($contract:ident { $($body:tt)* }) => {
        paste::paste! {
            // Generate the main bindings in a private module. That allows
            // us to re-export all items in our own module while also adding
            // some items ourselves.
            #[allow(non_snake_case)]
            mod [<$contract Private>] {
                alloy::sol! {
                    #[allow(missing_docs)]
                    #[sol(rpc)]
                    interface $contract {
                        $($body)*
                    }
                }
            }

            #[allow(non_snake_case)]
            pub mod $contract {
                use alloy::providers::DynProvider;

                pub use super::[<$contract Private>]::*;
                pub type Instance = $contract::[<$contract Instance>]<DynProvider>;
            }
        }
    };
}

// ERC20 token with an admin gated mint used to hand out test tokens.
bindings!(DashboardToken {
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
    function balanceOf(address account) external view returns (uint256);
    function allowance(address owner, address spender) external view returns (uint256);
    function approve(address spender, uint256 amount) external returns (bool);
    function mint(address to, uint256 amount) external;
});

// Two asset constant product pool. Reserves are reported relative to the
// asset passed as `quoteAsset`.
bindings!(SwapPool {
    function getReserves(address quoteAsset) external view returns (uint256 quoteReserve, uint256 baseReserve);
    function feeRate() external view returns (uint256);
    function swapQuoteForBase(uint256 amountIn, uint256 minAmountOut) external returns (uint256 amountOut);
    function swapBaseForQuote(uint256 amountIn, uint256 minAmountOut) external returns (uint256 amountOut);
});

// Key value registry of typed configuration entries. Access control follows
// the OpenZeppelin `AccessControl` layout.
bindings!(StateManager {
    function exists(bytes32 key) external view returns (bool);
    function getEntryInfo(bytes32 key) external view returns (uint8 valueType, bytes32 requiredPermission, bool isImmutable);
    function getAddress(bytes32 key) external view returns (address);
    function getUint(bytes32 key) external view returns (uint256);
    function getBool(bytes32 key) external view returns (bool);
    function getBytes32(bytes32 key) external view returns (bytes32);
    function setAddress(bytes32 key, address value, bytes32 requiredPermission) external;
    function setUint(bytes32 key, uint256 value, bytes32 requiredPermission) external;
    function setBool(bytes32 key, bool value, bytes32 requiredPermission) external;
    function setBytes32(bytes32 key, bytes32 value, bytes32 requiredPermission) external;

    function hasRole(bytes32 role, address account) external view returns (bool);

    event RoleGranted(bytes32 indexed role, address indexed account, address indexed sender);
    event RoleRevoked(bytes32 indexed role, address indexed account, address indexed sender);
});
