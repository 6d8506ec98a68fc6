// src/contracts/verifying_paymaster.rs
use ethers::contract::abigen;

abigen!(
    VerifyingPaymaster,
    r#"[
        struct UserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; uint256 callGasLimit; uint256 verificationGasLimit; uint256 preVerificationGas; uint256 maxFeePerGas; uint256 maxPriorityFeePerGas; bytes paymasterAndData; bytes signature; }
        function getHash(UserOperation userOp, uint48 validUntil, uint48 validAfter, address erc20Token, uint256 exchangeRate) external view returns (bytes32)
    ]"#
);
