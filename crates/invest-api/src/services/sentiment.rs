//! 감성 스냅샷 가공.
//!
//! 서브레딧 분포 상위 N개 추출과 일별 히스토리 집계를 담당합니다.

use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::repository::sentiment::SentimentPoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SubredditCount {
    pub subreddit: String,
    pub count: i64,
}

/// 일별 감성 집계.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SentimentHistoryPoint {
    /// YYYY-MM-DD
    pub date: String,
    pub score: f64,
    pub post_count: i64,
    pub bullish: i64,
    pub bearish: i64,
    pub neutral: i64,
}

/// `subreddit_distribution` JSON에서 게시물 수 상위 `top_n`개를 반환합니다.
///
/// 객체가 아니거나 값이 정수가 아닌 항목은 무시합니다.
pub fn top_subreddits(distribution: Option<&serde_json::Value>, top_n: usize) -> Vec<SubredditCount> {
    let Some(map) = distribution.and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut counts: Vec<SubredditCount> = map
        .iter()
        .filter_map(|(subreddit, count)| {
            count.as_i64().map(|count| SubredditCount {
                subreddit: subreddit.clone(),
                count,
            })
        })
        .collect();

    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.subreddit.cmp(&b.subreddit)));
    counts.truncate(top_n);
    counts
}

/// 날짜별 마지막 시점만 남겨 일별 히스토리를 만듭니다 (날짜 오름차순).
///
/// 비율로부터 건수를 계산하며, 반올림으로 생긴 음수는 0으로 보정합니다.
/// bearish/neutral 비율이 없는 과거 데이터는 나머지를 모두 neutral로 봅니다.
pub fn group_history_by_day(points: &[SentimentPoint]) -> Vec<SentimentHistoryPoint> {
    let mut latest: BTreeMap<String, &SentimentPoint> = BTreeMap::new();
    for point in points {
        let date = point.time.format("%Y-%m-%d").to_string();
        match latest.get(&date) {
            Some(existing) if existing.time >= point.time => {}
            _ => {
                latest.insert(date, point);
            }
        }
    }

    latest
        .into_iter()
        .map(|(date, p)| {
            let total = p.mention_count;
            let bullish = (p.bullish_pct * total as f64) as i64;
            let (bearish, neutral) = match (p.bearish_pct, p.neutral_pct) {
                (Some(bearish_pct), Some(_)) => {
                    let bearish = (bearish_pct * total as f64) as i64;
                    (bearish, total - bullish - bearish)
                }
                _ => (0, total - bullish),
            };

            SentimentHistoryPoint {
                date,
                score: p.sentiment_score,
                post_count: total,
                bullish,
                bearish: bearish.max(0),
                neutral: neutral.max(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn point(day: u32, hour: u32, score: f64, mentions: i64) -> SentimentPoint {
        SentimentPoint {
            time: Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap(),
            sentiment_score: score,
            bullish_pct: 0.5,
            bearish_pct: Some(0.3),
            neutral_pct: Some(0.2),
            mention_count: mentions,
        }
    }

    #[test]
    fn test_top_subreddits_sorted_and_truncated() {
        let dist = json!({"stocks": 4, "wallstreetbets": 12, "investing": 7, "bad": "x"});
        let top = top_subreddits(Some(&dist), 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].subreddit, "wallstreetbets");
        assert_eq!(top[1].count, 7);

        assert!(top_subreddits(None, 5).is_empty());
        assert!(top_subreddits(Some(&json!([1, 2])), 5).is_empty());
    }

    #[test]
    fn test_history_keeps_latest_point_per_day() {
        let points = vec![
            point(2, 9, 0.1, 10),
            point(1, 8, 0.4, 20),
            point(2, 18, 0.6, 100),
        ];
        let history = group_history_by_day(&points);

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, "2025-03-01");
        assert_eq!(history[1].date, "2025-03-02");
        assert_eq!(history[1].score, 0.6);
        assert_eq!(history[1].bullish, 50);
        assert_eq!(history[1].bearish, 30);
        assert_eq!(history[1].neutral, 20);
    }

    #[test]
    fn test_history_fallback_and_clamp() {
        let mut legacy = point(5, 12, 0.0, 10);
        legacy.bearish_pct = None;
        legacy.neutral_pct = None;
        legacy.bullish_pct = 0.3;
        let history = group_history_by_day(&[legacy]);
        assert_eq!((history[0].bullish, history[0].bearish, history[0].neutral), (3, 0, 7));

        let mut skewed = point(6, 12, 0.0, 10);
        skewed.bullish_pct = 0.8;
        skewed.bearish_pct = Some(0.5);
        let history = group_history_by_day(&[skewed]);
        assert_eq!(history[0].neutral, 0);
    }
}
