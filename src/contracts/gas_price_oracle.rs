// src/contracts/gas_price_oracle.rs
use ethers::contract::abigen;

// From https://github.com/ethereum-optimism/optimism/blob/develop/packages/contracts-bedrock/src/L2/GasPriceOracle.sol
abigen!(
    GasPriceOracle,
    r#"[
        function getL1Fee(bytes _data) external view returns (uint256)
    ]"#
);
