use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use askama::Template;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use shared::templates::SummaryReportTemplate;
use shared::{Signal, SignalSummary};
use teloxide::prelude::*;

use super::reply_html;
use crate::repositories::SignalRepository;
use crate::state::{AppState, HandlerResult};

/// UTC bounds `[start, end)` of a calendar day in `tz`.
pub fn local_day_bounds(date: NaiveDate, tz: Tz) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start_of = |d: NaiveDate| {
        d.and_hms_opt(0, 0, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    };
    Some((start_of(date)?, start_of(date.succ_opt()?)?))
}

/// Next occurrence of `hour`:00 UTC strictly after `now`.
pub fn next_report_at(now: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    let today = now.date_naive().and_hms_opt(hour, 0, 0)?.and_utc();
    if today > now {
        Some(today)
    } else {
        Some(today + Duration::days(1))
    }
}

/// Top symbols by signal count with their TP1 hit rate.
fn symbol_lines(signals: &[Signal], limit: usize) -> String {
    let mut by_symbol: BTreeMap<&str, Vec<Signal>> = BTreeMap::new();
    for s in signals {
        by_symbol.entry(s.symbol.as_str()).or_default().push(s.clone());
    }
    let mut rows: Vec<(&str, SignalSummary)> = by_symbol
        .into_iter()
        .map(|(symbol, group)| (symbol, SignalSummary::from_signals(&group)))
        .collect();
    rows.sort_by(|a, b| b.1.total.cmp(&a.1.total).then(a.0.cmp(b.0)));
    rows.iter()
        .take(limit)
        .map(|(symbol, s)| {
            if s.hit_rates.resolved > 0 {
                format!("• <b>{}</b>: {} signals, TP1 {:.1}%", symbol, s.total, s.hit_rates.tp1)
            } else {
                format!("• <b>{}</b>: {} signals", symbol, s.total)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn day_summary(repo: &SignalRepository, date: NaiveDate, tz: Tz, title: &str) -> Result<String> {
    let (from, to) = local_day_bounds(date, tz).ok_or_else(|| anyhow::anyhow!("no local midnight on {}", date))?;
    let signals = repo.list_between(from, to).await?;
    let summary = SignalSummary::from_signals(&signals);
    Ok(SummaryReportTemplate::new(&format!("{} ({})", title, date.format("%d %B %Y")), &summary).render()?)
}

/// Yesterday and today, by local calendar day.
pub async fn daily_summary_text(repo: &SignalRepository, tz: Tz) -> Result<String> {
    let today = Utc::now().with_timezone(&tz).date_naive();
    let yesterday = today.pred_opt().unwrap_or(today);
    Ok(format!(
        "{}\n\n{}",
        day_summary(repo, yesterday, tz, "Yesterday").await?,
        day_summary(repo, today, tz, "Today").await?
    ))
}

pub async fn handle_summary(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let text = daily_summary_text(&state.repo, state.config.timezone).await?;
    reply_html(&bot, &msg, text).await
}

pub async fn handle_report(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let signals = state.repo.list_all().await?;
    let summary = SignalSummary::from_signals(&signals);
    let mut text = SummaryReportTemplate::new("All-time Report", &summary).render()?;
    if !signals.is_empty() {
        text.push_str("\n\n🏆 <b>Most signalled</b>\n");
        text.push_str(&symbol_lines(&signals, 5));
    }
    reply_html(&bot, &msg, text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::signal_repository::tests::{memory_repo, sample_signal};
    use chrono::Timelike;
    use shared::SignalStatus;

    #[test]
    fn test_local_day_bounds() {
        // Karachi is UTC+5 all year.
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (from, to) = local_day_bounds(date, chrono_tz::Asia::Karachi).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 2, 29, 19, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 3, 1, 19, 0, 0).unwrap());
    }

    #[test]
    fn test_next_report_at() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(next_report_at(now, 9), Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        assert_eq!(next_report_at(now, 8), Some(Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap()));
        assert_eq!(next_report_at(now, 24), None);
        assert_eq!(next_report_at(now, 9).map(|t| t.hour()), Some(9));
    }

    #[test]
    fn test_symbol_lines() {
        let now = Utc::now();
        let mut hit = sample_signal("BTC/USDT", now);
        hit.status = SignalStatus::Tp2;
        let signals = vec![
            hit,
            sample_signal("BTC/USDT", now),
            sample_signal("ETH/USDT", now),
        ];
        let lines = symbol_lines(&signals, 5);
        assert_eq!(
            lines,
            "• <b>BTC/USDT</b>: 2 signals, TP1 100.0%\n• <b>ETH/USDT</b>: 1 signals"
        );
    }

    #[tokio::test]
    async fn test_daily_summary_counts_today() {
        let repo = memory_repo().await;
        repo.insert(&sample_signal("BTC/USDT", Utc::now())).await.unwrap();
        let text = daily_summary_text(&repo, chrono_tz::UTC).await.unwrap();
        assert!(text.contains("Yesterday"));
        assert!(text.contains("Today"));
    }
}
