//! Plain-text rendering for the `discover`, `credentials` and `history`
//! subcommands.

use std::fmt::Write;

use stakelink_discovery::config::LOVELACE_PER_ADA;
use stakelink_discovery::credential::HashKind;
use stakelink_discovery::{
    Address, ClusteredWallet, PaymentCredential, ShelleyAddress, StakeCredential, TransactionRef,
};

/// `1_234_567` lovelace -> `"1.234567"`.
pub fn format_ada(lovelace: u64) -> String {
    format!(
        "{}.{:06}",
        lovelace / LOVELACE_PER_ADA,
        lovelace % LOVELACE_PER_ADA
    )
}

pub fn render_wallet(wallet: &ClusteredWallet) -> String {
    let mut out = String::new();
    let delegation = wallet.delegation();

    let _ = writeln!(out, "Cluster for {}", wallet.seed());
    let _ = writeln!(out, "  Addresses        {}", wallet.addresses().len());
    let _ = writeln!(out, "  Reward accounts  {}", wallet.reward_accounts().len());
    let _ = writeln!(out, "  UTXOs            {}", wallet.utxos().len());

    let _ = writeln!(out, "\nBalance");
    let _ = writeln!(out, "  ADA              {}", format_ada(wallet.balance().lovelace));
    for (unit, quantity) in &wallet.balance().assets {
        let _ = writeln!(out, "  {unit}  {quantity}");
    }
    let _ = writeln!(
        out,
        "  Rewards          {} ADA withdrawable",
        format_ada(wallet.withdrawable_rewards())
    );

    let _ = writeln!(out, "\nDelegation");
    let _ = writeln!(out, "  Total            {} ADA", format_ada(delegation.total_balance));
    if delegation.is_unstaked() {
        let _ = writeln!(out, "  Not delegated");
    } else {
        let _ = writeln!(
            out,
            "  Staked           {} ADA ({:.2}%)",
            format_ada(delegation.staked_amount),
            delegation.staked_percentage
        );
        for pool in &delegation.pools {
            let _ = writeln!(
                out,
                "  {}  {} ADA ({:.2}%)",
                pool.pool_id,
                format_ada(pool.staked_amount),
                pool.share_percentage
            );
        }
    }

    let _ = writeln!(out, "\nAddresses");
    for info in wallet.addresses() {
        let stake = info
            .stake_credential
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or("-");
        let _ = writeln!(
            out,
            "  {}  {} ADA  {}",
            info.address,
            format_ada(info.value.lovelace),
            stake
        );
    }

    if !wallet.reward_accounts().is_empty() {
        let _ = writeln!(out, "\nReward accounts");
        for account in wallet.reward_accounts() {
            let _ = writeln!(
                out,
                "  {}  controlled {} ADA  withdrawable {} ADA  pool {}",
                account.stake_credential,
                format_ada(account.controlled_amount),
                format_ada(account.withdrawable_amount),
                account.pool_id.as_deref().unwrap_or("-")
            );
        }
    }

    out
}

pub fn render_credentials(
    address: &Address,
    decoded: &ShelleyAddress,
    payment: Option<&PaymentCredential>,
    stake: Option<&StakeCredential>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Address     {address}");
    let _ = writeln!(out, "Type        {}", decoded.kind());
    let _ = writeln!(out, "Network tag {}", decoded.network_tag());

    let payment_line = match (payment, decoded.payment_part()) {
        (Some(credential), _) => credential.to_string(),
        (None, Some(part)) if part.kind == HashKind::Script => format!("script {}", part.to_hex()),
        (None, _) => "-".to_string(),
    };
    let _ = writeln!(out, "Payment     {payment_line}");
    let _ = writeln!(
        out,
        "Stake       {}",
        stake.map(|s| s.as_str()).unwrap_or("-")
    );
    out
}

pub fn render_history(address: &Address, transactions: &[TransactionRef]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} transactions for {address}", transactions.len());
    for tx in transactions {
        let _ = writeln!(
            out,
            "  {}  block {}  #{}  {}",
            tx.block_time.format("%Y-%m-%d %H:%M:%S"),
            tx.block_height,
            tx.tx_index,
            tx.tx_hash
        );
    }
    out
}
