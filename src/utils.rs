use rust_decimal::Decimal;

// Format amount with appropriate precision
pub fn format_amount(amount: Decimal, symbol: &str) -> String {
    match symbol.to_uppercase().as_str() {
        "ETH" | "WETH" => format!("{:.6}", amount),           // 6 decimals
        "USDC" | "USDT" | "DAI" => format!("{:.2}", amount), // cents
        "BTC" | "WBTC" | "CBBTC" => format!("{:.8}", amount), // 8 decimals
        _ => format!("{}", amount.normalize()),
    }
}

// Shorten an id or hash for display
pub fn shorten_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 10 {
        return id.to_string();
    }

    let start: String = chars[..5].iter().collect();
    let end: String = chars[chars.len() - 5..].iter().collect();

    format!("{}...{}", start, end)
}
