//! Tolerant JSON extraction and schema repair for model output.
//!
//! Models return fenced blocks, prose around the object, trailing commas,
//! arithmetic in numeric fields ("3000 * 0.95", "price * 1.05"). The rule
//! here: never trust, always repair. Every public function returns a value
//! that satisfies its type's invariants no matter what came in.

use super::{RoundDraft, Signal, SignalAction};
use crate::feeds::MarketSnapshot;
use crate::strategy::ParsedStrategy;
use serde_json::Value;

/// Pull the first JSON object out of raw model output: drop code fences,
/// slice from the first `{` to the last `}`, normalize trailing commas and
/// empty values, then parse.
pub fn extract_json(raw: &str) -> Option<Value> {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    let text = text.trim_end_matches("```").trim();

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &text[start..=end];

    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }
    serde_json::from_str(&normalize_json(candidate)).ok()
}

/// Fix the malformations models actually produce: trailing commas before a
/// closing brace/bracket and dangling `"key":` with no value.
fn normalize_json(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Drop the comma when the next non-space char closes a scope.
                let mut lookahead = chars.clone();
                let mut next_meaningful = None;
                for n in lookahead.by_ref() {
                    if !n.is_whitespace() {
                        next_meaningful = Some(n);
                        break;
                    }
                }
                if matches!(next_meaningful, Some('}') | Some(']')) {
                    continue;
                }
                out.push(c);
            }
            ':' => {
                out.push(c);
                let mut lookahead = chars.clone();
                let mut next_meaningful = None;
                for n in lookahead.by_ref() {
                    if !n.is_whitespace() {
                        next_meaningful = Some(n);
                        break;
                    }
                }
                // `"key": ,` or `"key": }` -> null it out.
                if matches!(next_meaningful, Some(',') | Some('}')) {
                    out.push_str(" null");
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Coerce a raw field into a plain number: numbers pass through, numeric
/// strings parse, and arithmetic strings evaluate with `price` substituted
/// for the current snapshot price.
pub fn coerce_number(value: Option<&Value>, current_price: f64) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let cleaned = s
                .to_ascii_lowercase()
                .replace("current_price", "price")
                .replace("entry_price", "price")
                .replace("current", "price")
                .replace(['$', ','], "");
            eval_arithmetic(&cleaned, current_price)
        }
        _ => None,
    }
}

/// Left-to-right evaluation of `a op b op c` with +-*/ and a `price`
/// placeholder. Enough for what models emit in numeric slots.
fn eval_arithmetic(expr: &str, price: f64) -> Option<f64> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }

    let mut acc: Option<f64> = None;
    let mut pending_op = '+';
    let mut token = String::new();

    let flush = |acc: &mut Option<f64>, op: char, token: &mut String| -> bool {
        let t = token.trim();
        if t.is_empty() {
            return true;
        }
        let operand = if t == "price" {
            price
        } else {
            match t.parse::<f64>() {
                Ok(v) => v,
                Err(_) => return false,
            }
        };
        *acc = Some(match (*acc, op) {
            (None, _) => operand,
            (Some(a), '+') => a + operand,
            (Some(a), '-') => a - operand,
            (Some(a), '*') => a * operand,
            (Some(a), '/') => {
                if operand == 0.0 {
                    return false;
                }
                a / operand
            }
            (Some(_), _) => return false,
        });
        token.clear();
        true
    };

    for (i, c) in expr.chars().enumerate() {
        let is_operator = matches!(c, '+' | '*' | '/') || (c == '-' && i > 0 && !token.is_empty());
        if is_operator {
            if !flush(&mut acc, pending_op, &mut token) {
                return None;
            }
            pending_op = c;
        } else if !c.is_whitespace() {
            token.push(c);
        }
    }
    if !flush(&mut acc, pending_op, &mut token) {
        return None;
    }

    acc.filter(|v| v.is_finite())
}

fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    names.iter().find_map(|n| obj.get(*n))
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    field(value, names)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn string_list(value: &Value, names: &[&str]) -> Vec<String> {
    field(value, names)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Repair raw signal JSON into a valid [`Signal`]. `None` (nothing
/// extractable) yields the HOLD fallback.
pub fn repair_signal(value: Option<Value>, snapshot: &MarketSnapshot) -> Signal {
    let Some(value) = value else {
        return fallback_signal(snapshot);
    };
    let price = snapshot.price;

    let action = string_field(&value, &["signal", "action"])
        .and_then(|s| SignalAction::parse(&s))
        .unwrap_or(SignalAction::Hold);

    let confidence = coerce_number(field(&value, &["confidence"]), price)
        .map(|c| c.clamp(1.0, 10.0))
        .unwrap_or(5.0);

    let reason = string_field(&value, &["reason", "reasoning", "rationale"])
        .unwrap_or_else(|| "no rationale provided".to_string());

    let entry_price = coerce_number(field(&value, &["entry_price", "entryPrice", "entry"]), price)
        .filter(|p| *p > 0.0)
        .unwrap_or(price);

    let mut stop_loss = coerce_number(field(&value, &["stop_loss", "stopLoss"]), price)
        .filter(|p| *p > 0.0)
        .unwrap_or(0.0);
    let mut take_profit = coerce_number(field(&value, &["take_profit", "takeProfit"]), price)
        .filter(|p| *p > 0.0)
        .unwrap_or(0.0);

    // Enforce side-consistent bracketing: BUY stops below and targets
    // above entry, SELL inverse. Defaults are ±5% / ±10%.
    match action {
        SignalAction::Sell => {
            if stop_loss <= entry_price {
                stop_loss = entry_price * 1.05;
            }
            if take_profit <= 0.0 || take_profit >= entry_price {
                take_profit = entry_price * 0.90;
            }
        }
        SignalAction::Buy | SignalAction::Hold => {
            if stop_loss <= 0.0 || stop_loss >= entry_price {
                stop_loss = entry_price * 0.95;
            }
            if take_profit <= entry_price {
                take_profit = entry_price * 1.10;
            }
        }
    }

    let risk_reward = coerce_number(
        field(&value, &["risk_reward", "riskReward", "risk_reward_ratio"]),
        price,
    )
    .filter(|r| *r > 0.0)
    .unwrap_or(2.0);

    Signal {
        action,
        confidence,
        reason,
        entry_price,
        stop_loss,
        take_profit,
        risk_reward,
    }
}

/// Default signal when nothing usable came back: HOLD at the snapshot
/// price with conservative brackets.
pub fn fallback_signal(snapshot: &MarketSnapshot) -> Signal {
    let price = snapshot.price;
    Signal {
        action: SignalAction::Hold,
        confidence: 5.0,
        reason: "model output unusable; holding".to_string(),
        entry_price: price,
        stop_loss: price * 0.95,
        take_profit: price * 1.10,
        risk_reward: 2.0,
    }
}

const STRATEGY_TYPES: &[&str] = &["technical", "fundamental", "sentiment", "mixed"];

/// Repair raw parsed-strategy JSON; every field present afterwards.
pub fn repair_parsed_strategy(value: Option<Value>, original_text: &str) -> ParsedStrategy {
    let Some(value) = value else {
        return fallback_parsed_strategy(original_text);
    };

    let strategy_type = string_field(&value, &["strategy_type", "strategyType", "type"])
        .map(|s| s.to_ascii_lowercase())
        .filter(|s| STRATEGY_TYPES.contains(&s.as_str()))
        .unwrap_or_else(|| "mixed".to_string());

    let assets = {
        let listed = string_list(&value, &["assets", "symbols"]);
        if listed.is_empty() {
            symbols_mentioned(original_text)
        } else {
            listed
        }
    };

    let suggested_base_tokens = string_list(
        &value,
        &["suggested_base_tokens", "suggestedBaseTokens", "suggested"],
    );

    ParsedStrategy {
        strategy_type,
        indicators: string_list(&value, &["indicators"])
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .collect(),
        entry_conditions: string_field(&value, &["entry_conditions", "entryConditions"])
            .unwrap_or_else(|| "enter on positive momentum".to_string()),
        exit_conditions: string_field(&value, &["exit_conditions", "exitConditions"])
            .unwrap_or_else(|| "exit on stop-loss or take-profit".to_string()),
        risk_management: string_field(&value, &["risk_management", "riskManagement"])
            .unwrap_or_else(|| "size positions by confidence".to_string()),
        timeframe: string_field(&value, &["timeframe"]).unwrap_or_else(|| "1h".to_string()),
        base_ecosystem: field(&value, &["base_ecosystem", "baseEcosystem"])
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        clarity_score: coerce_number(field(&value, &["clarity_score", "clarityScore"]), 0.0)
            .map(|c| c.clamp(1.0, 10.0))
            .unwrap_or(5.0),
        actionable: field(&value, &["actionable"])
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        assets,
        suggested_base_tokens,
    }
}

/// Heuristic fallback when the model gave nothing: pick up ticker-looking
/// words from the prose, defaulting to ETH.
pub fn fallback_parsed_strategy(text: &str) -> ParsedStrategy {
    let assets = symbols_mentioned(text);
    ParsedStrategy {
        strategy_type: "mixed".to_string(),
        indicators: Vec::new(),
        entry_conditions: "enter on positive momentum".to_string(),
        exit_conditions: "exit on stop-loss or take-profit".to_string(),
        risk_management: "size positions by confidence".to_string(),
        timeframe: "1h".to_string(),
        assets,
        base_ecosystem: true,
        clarity_score: 5.0,
        actionable: true,
        suggested_base_tokens: Vec::new(),
    }
}

fn symbols_mentioned(text: &str) -> Vec<String> {
    const KNOWN: &[&str] = &[
        "ETH", "WETH", "USDC", "TOSHI", "DEGEN", "BRETT", "AERO", "HIGHER",
    ];
    let upper = text.to_ascii_uppercase();
    let mut found: Vec<String> = KNOWN
        .iter()
        .filter(|sym| {
            upper
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word == **sym)
        })
        .map(|s| s.to_string())
        .collect();
    if found.is_empty() {
        found.push("ETH".to_string());
    }
    found
}

/// Repair raw round-draft JSON, filling the documented defaults.
pub fn repair_round_draft(value: Option<Value>) -> RoundDraft {
    let value = value.unwrap_or(Value::Null);

    let tokens = {
        let listed = string_list(&value, &["tokens", "allowedTokens"]);
        if listed.is_empty() {
            vec!["ETH".to_string(), "TOSHI".to_string(), "DEGEN".to_string()]
        } else {
            listed
        }
    };

    RoundDraft {
        title: string_field(&value, &["title"]).unwrap_or_else(|| "Trading Round".to_string()),
        description: string_field(&value, &["description"]).unwrap_or_default(),
        tokens,
        duration_secs: coerce_number(field(&value, &["duration"]), 0.0)
            .filter(|d| *d > 0.0)
            .map(|d| d as u64)
            .unwrap_or(300),
        starting_balance: coerce_number(field(&value, &["startingBalance", "starting_balance"]), 0.0)
            .filter(|b| *b > 0.0)
            .unwrap_or(10_000.0),
        investment_amount: coerce_number(
            field(&value, &["investmentAmount", "investment_amount"]),
            0.0,
        )
        .filter(|v| *v > 0.0),
        target_profit_percent: coerce_number(
            field(&value, &["targetProfitPercent", "target_profit_percent"]),
            0.0,
        )
        .filter(|v| *v > 0.0)
        .unwrap_or(5.0),
        strategy: string_field(&value, &["strategy"]),
        game_type: string_field(&value, &["gameType", "game_type"])
            .unwrap_or_else(|| "standard".to_string()),
        risk_level: string_field(&value, &["riskLevel", "risk_level"])
            .unwrap_or_else(|| "medium".to_string()),
        timeframe: string_field(&value, &["timeframe"]).unwrap_or_else(|| "5m".to_string()),
    }
}
