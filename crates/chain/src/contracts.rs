//! Contract interfaces for the lending ledger, its liquidation module, the
//! strategy viewer, the peg oracle and ERC20 tokens.

use alloy::sol;

use tranche_core::OnChainPositionRow;

sol! {
    /// Position row as stored by the lending ledger
    #[derive(Debug)]
    struct PositionMetadata {
        uint256 trancheId;
        address strategy;
        uint256 collateral;
        uint256 debt;
        address token;
        uint256 accruedYield;
        uint256 collateralValue;
        uint256 borrowablePer10k;
        address owner;
        address trancheContract;
    }

    /// Per-strategy metadata from the strategy viewer
    #[derive(Debug)]
    struct StrategyMetadata {
        address strategy;
        address token;
        uint256 APF;
        uint256 totalCollateral;
        uint256 borrowablePer10k;
        uint256 valuePer1e18;
        bytes32 strategyName;
        uint256 tvl;
        uint256 harvestBalance2Tally;
        uint8 yieldType;
        uint256 stabilityFee;
        address underlyingStrategy;
    }

    #[sol(rpc)]
    interface IStableLending2 {
        function viewPositionsByTrackingPeriod(uint256 trackingPeriod)
            external view returns (PositionMetadata[] memory);

        function viewPositionMetadata(uint256 trancheId)
            external view returns (PositionMetadata memory);
    }

    #[sol(rpc)]
    interface IStrategyViewer {
        function viewMetadata(
            address lendingContract,
            address[] calldata tokens,
            address[] calldata strategies
        ) external view returns (StrategyMetadata[] memory);
    }

    #[sol(rpc)]
    interface IPegOracle {
        function viewAmountInPeg(address token, uint256 inAmount, address pegCurrency)
            external view returns (uint256);

        /// State-changing variant that refreshes the stored price
        function getAmountInPeg(address token, uint256 inAmount, address pegCurrency)
            external returns (uint256);
    }

    #[sol(rpc)]
    interface IStableLending2Liquidation {
        function viewBidTarget(uint256 trancheId, uint256 requestedColVal)
            external view returns (uint256);

        function liquidate(
            uint256 trancheId,
            uint256 collateralRequested,
            uint256 rebalancingBid,
            address recipient
        ) external;
    }

    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
    }
}

impl From<PositionMetadata> for OnChainPositionRow {
    fn from(row: PositionMetadata) -> Self {
        Self {
            tranche_id: row.trancheId,
            strategy: row.strategy,
            collateral: row.collateral,
            debt: row.debt,
            token: row.token,
            accrued_yield: row.accruedYield,
            collateral_value: row.collateralValue,
            borrowable_per_10k: row.borrowablePer10k,
            owner: row.owner,
            tranche_contract: row.trancheContract,
        }
    }
}
