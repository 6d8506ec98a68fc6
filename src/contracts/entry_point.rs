// src/contracts/entry_point.rs
use ethers::contract::abigen;

abigen!(
    EntryPoint,
    r#"[
        struct UserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; uint256 callGasLimit; uint256 verificationGasLimit; uint256 preVerificationGas; uint256 maxFeePerGas; uint256 maxPriorityFeePerGas; bytes paymasterAndData; bytes signature; }
        function handleOps(UserOperation[] ops, address beneficiary) external
        function simulateHandleOp(UserOperation op, address target, bytes targetCallData) external
        error ExecutionResult(uint256 preOpGas, uint256 paid, uint48 validAfter, uint48 validUntil, bool targetSuccess, bytes targetResult)
        error FailedOp(uint256 opIndex, string reason)
    ]"#
);
