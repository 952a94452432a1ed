//! Prompt builders. Each returns (system, user); the worker queue owns
//! model parameters.

use crate::feeds::MarketSnapshot;
use crate::strategy::ParsedStrategy;

pub fn parse_strategy_prompt(text: &str) -> (String, String) {
    let system = "You are a trading strategy analyst for Base-network tokens. \
Respond with ONLY a JSON object, no prose, no code fences. Schema: \
{\"strategy_type\": \"technical|fundamental|sentiment|mixed\", \
\"indicators\": [string], \"entry_conditions\": string, \
\"exit_conditions\": string, \"risk_management\": string, \
\"timeframe\": string, \"assets\": [string], \"base_ecosystem\": bool, \
\"clarity_score\": 1-10, \"actionable\": bool, \
\"suggested_base_tokens\": [string]}"
        .to_string();

    let user = format!(
        "Analyze this trading strategy and return the JSON:\n\n{}",
        text.trim().chars().take(2000).collect::<String>()
    );

    (system, user)
}

pub fn signal_prompt(snapshot: &MarketSnapshot, parsed: &ParsedStrategy) -> (String, String) {
    let system = "You are a disciplined trading signal generator. Respond with \
ONLY a JSON object, no prose, no code fences. Schema: \
{\"signal\": \"BUY|SELL|HOLD\", \"confidence\": 1-10, \"reason\": string, \
\"entry_price\": number, \"stop_loss\": number, \"take_profit\": number, \
\"risk_reward\": number}. All prices are plain numbers in USD."
        .to_string();

    let user = format!(
        "Market data for {}:\n\
price_usd={:.8}\nchange_24h_pct={:.2}\nvolume_24h_usd={:.0}\nliquidity_usd={:.0}\n\n\
Strategy ({}, timeframe {}):\nindicators: {}\nentry: {}\nexit: {}\nrisk: {}\n\n\
Return the signal JSON now.",
        snapshot.symbol,
        snapshot.price,
        snapshot.change_24h,
        snapshot.volume_24h,
        snapshot.liquidity,
        parsed.strategy_type,
        parsed.timeframe,
        parsed.indicators.join(", "),
        parsed.entry_conditions,
        parsed.exit_conditions,
        parsed.risk_management,
    );

    (system, user)
}

pub fn round_prompt(query: &str) -> (String, String) {
    let system = "You translate a user's request into a trading round \
configuration. Respond with ONLY a JSON object, no prose. Schema: \
{\"title\": string, \"description\": string, \"tokens\": [string], \
\"duration\": seconds, \"startingBalance\": number, \
\"investmentAmount\": number, \"targetProfitPercent\": number, \
\"strategy\": string, \"gameType\": string, \"riskLevel\": \
\"low|medium|high\", \"timeframe\": string}"
        .to_string();

    let user = format!(
        "Request: {}\n\nReturn the round configuration JSON now.",
        query.trim().chars().take(1000).collect::<String>()
    );

    (system, user)
}

pub fn insight_prompt(snapshot: &MarketSnapshot, timeframe: &str) -> (String, String) {
    let system = "You are a concise crypto market analyst covering the Base \
ecosystem. Three to five sentences, plain text, no financial advice \
disclaimers."
        .to_string();

    let user = format!(
        "Give a {} outlook for {}. Current price ${:.6}, 24h change {:.2}%, \
24h volume ${:.0}, liquidity ${:.0}.",
        timeframe,
        snapshot.symbol,
        snapshot.price,
        snapshot.change_24h,
        snapshot.volume_24h,
        snapshot.liquidity,
    );

    (system, user)
}
