//! Typed contract bindings.

use ethers::contract::abigen;

abigen!(
    IntentsEngine,
    r#"[
        function previewCommand(string intent) external view returns (address, uint256, uint256, address, bytes, bytes)
        function command(string intent) external payable
    ]"#
);

abigen!(
    Erc20Token,
    r#"[
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#
);
