use askama::Template;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::{Direction, Signal, SignalStatus};
use crate::report::SignalSummary;

/// Prices are shown with more decimals the smaller they are.
pub fn format_price(price: f64) -> String {
    let abs = price.abs();
    if abs >= 100.0 {
        format!("{:.2}", price)
    } else if abs >= 1.0 {
        format!("{:.4}", price)
    } else {
        format!("{:.6}", price)
    }
}

/// Thousands-separated whole number, e.g. `12,345,678`.
pub fn format_volume(volume: f64) -> String {
    let whole = volume.max(0.0).round() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_local_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%d %B %Y, %I:%M %p").to_string()
}

/// Minimal escaping for text embedded in Telegram HTML messages.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Template)]
#[template(path = "signal_message.html.jinja", escape = "none")]
pub struct SignalMessageTemplate {
    pub direction_emoji: &'static str,
    pub direction: String,
    pub symbol: String,
    pub entry: String,
    pub tp1: String,
    pub tp2: String,
    pub tp3: String,
    pub sl: String,
    pub tp1_profit: String,
    pub tp2_profit: String,
    pub tp3_profit: String,
    pub sl_loss: String,
    pub tp1_possibility: String,
    pub tp2_possibility: String,
    pub tp3_possibility: String,
    pub confidence: String,
    pub agreement: String,
    pub timeframe: String,
    pub trade_type: String,
    pub trade_duration: String,
    pub leverage: String,
    pub quote_volume: String,
    pub conditions: String,
    pub time: String,
    pub bot_name: String,
}

impl SignalMessageTemplate {
    pub fn new(signal: &Signal, tz: Tz, bot_name: &str) -> Self {
        let pct = |price: f64| format!("{:.2}", signal.profit_pct(price).abs());
        Self {
            direction_emoji: match signal.direction {
                Direction::Long => "🟢",
                Direction::Short => "🔴",
            },
            direction: signal.direction.to_string(),
            symbol: escape_html(&signal.symbol),
            entry: format_price(signal.entry),
            tp1: format_price(signal.tp1),
            tp2: format_price(signal.tp2),
            tp3: format_price(signal.tp3),
            sl: format_price(signal.sl),
            tp1_profit: pct(signal.tp1),
            tp2_profit: pct(signal.tp2),
            tp3_profit: pct(signal.tp3),
            sl_loss: pct(signal.sl),
            tp1_possibility: format!("{:.2}", signal.tp1_possibility),
            tp2_possibility: format!("{:.2}", signal.tp2_possibility),
            tp3_possibility: format!("{:.2}", signal.tp3_possibility),
            confidence: format!("{:.2}", signal.confidence),
            agreement: format!("{:.0}", signal.agreement),
            timeframe: escape_html(&signal.timeframe),
            trade_type: signal.trade_type.to_string(),
            trade_duration: escape_html(&signal.trade_duration),
            leverage: escape_html(&signal.leverage),
            quote_volume: format_volume(signal.quote_volume_24h),
            conditions: escape_html(&signal.conditions_joined()),
            time: format_local_time(signal.timestamp, tz),
            bot_name: escape_html(bot_name),
        }
    }
}

#[derive(Template)]
#[template(path = "outcome_message.html.jinja", escape = "none")]
pub struct OutcomeMessageTemplate {
    pub emoji: &'static str,
    pub symbol: String,
    pub direction: String,
    pub label: &'static str,
    pub entry: String,
    pub price: String,
    pub profit: String,
    pub time: String,
}

impl OutcomeMessageTemplate {
    pub fn new(signal: &Signal, status: SignalStatus, price: f64, at: DateTime<Utc>, tz: Tz) -> Self {
        let (emoji, label) = match status {
            SignalStatus::Tp1 => ("✅", "TP1 HIT"),
            SignalStatus::Tp2 => ("✅", "TP2 HIT"),
            SignalStatus::Tp3 => ("🏆", "TP3 HIT"),
            SignalStatus::Sl => ("❌", "STOP LOSS HIT"),
            SignalStatus::Pending => ("⏳", "PENDING"),
        };
        Self {
            emoji,
            symbol: escape_html(&signal.symbol),
            direction: signal.direction.to_string(),
            label,
            entry: format_price(signal.entry),
            price: format_price(price),
            profit: format!("{:+.2}", signal.profit_pct(price)),
            time: format_local_time(at, tz),
        }
    }
}

#[derive(Template)]
#[template(path = "summary_report.html.jinja", escape = "none")]
pub struct SummaryReportTemplate {
    pub title: String,
    pub total: usize,
    pub long: usize,
    pub short: usize,
    pub avg_confidence: String,
    pub tp1: usize,
    pub tp2: usize,
    pub tp3: usize,
    pub sl: usize,
    pub pending: usize,
    pub resolved: usize,
    pub tp1_rate: String,
    pub tp2_rate: String,
    pub tp3_rate: String,
    pub sl_rate: String,
}

impl SummaryReportTemplate {
    pub fn new(title: &str, summary: &SignalSummary) -> Self {
        let rates = summary.hit_rates;
        Self {
            title: escape_html(title),
            total: summary.total,
            long: summary.long,
            short: summary.short,
            avg_confidence: format!("{:.2}", summary.avg_confidence),
            tp1: summary.tp1,
            tp2: summary.tp2,
            tp3: summary.tp3,
            sl: summary.sl,
            pending: summary.pending,
            resolved: rates.resolved,
            tp1_rate: format!("{:.1}", rates.tp1),
            tp2_rate: format!("{:.1}", rates.tp2),
            tp3_rate: format!("{:.1}", rates.tp3),
            sl_rate: format!("{:.1}", rates.sl),
        }
    }
}

#[derive(Template)]
#[template(path = "backtest_report.html.jinja", escape = "none")]
pub struct BacktestReportTemplate {
    pub symbol: String,
    pub timeframe: String,
    pub candles: usize,
    pub positions: usize,
    pub signals: usize,
    pub long: usize,
    pub short: usize,
    pub tp1: usize,
    pub tp2: usize,
    pub tp3: usize,
    pub sl: usize,
    pub pending: usize,
    pub resolved: usize,
    pub tp1_rate: String,
    pub tp2_rate: String,
    pub tp3_rate: String,
    pub sl_rate: String,
}
