// src/contracts/node_interface.rs
use ethers::contract::abigen;

// From https://github.com/OffchainLabs/nitro-contracts/blob/main/src/node-interface/NodeInterface.sol
abigen!(
    NodeInterface,
    r#"[
        function gasEstimateL1Component(address to, bool contractCreation, bytes data) external payable returns (uint64 gasEstimateForL1, uint256 baseFee, uint256 l1BaseFeeEstimate)
    ]"#
);
