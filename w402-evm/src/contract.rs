//! Token contract ABI.

use alloy_sol_types::sol;

sol! {
    /// The read-only subset of an ERC-3009 / ERC-20 token used for signing.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEIP3009 {
        function name() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
    }
}
