/// Render an integer base-unit amount with `decimals` fractional digits, for log output.
///
/// Computed on integers so large 18-decimal balances keep every digit. Scales beyond what
/// `u128` can hold fall back to the raw base-unit amount.
pub fn format_token_amount(amount: u128, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let Some(divisor) = 10u128.checked_pow(decimals as u32) else {
        return amount.to_string();
    };
    format!(
        "{}.{:0width$}",
        amount / divisor,
        amount % divisor,
        width = decimals as usize
    )
}
