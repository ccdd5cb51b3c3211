//! # A 股交易日历
//!
//! 交易所所在时区为中国标准时间 (UTC+8，无夏令时)。
//! 仅按工作日判断交易日，法定节假日不在本模块建模范围内。

use super::TimeFrame;
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc,
    Weekday,
};

const CN_OFFSET_SECS: i32 = 8 * 3600;

/// 交易所本地时区 (UTC+8)
pub fn cn_offset() -> FixedOffset {
    FixedOffset::east_opt(CN_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// 构造本地时钟时间点；非法输入回落到零点。
pub fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// 将 UTC 时间转换为交易所本地时间
pub fn to_cn(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    dt.with_timezone(&cn_offset())
}

/// 将交易所本地的日期与时间转换为 UTC 时间
pub fn cn_datetime(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    from_cn_naive(date.and_time(time))
}

/// 将不带时区的本地时间解释为 UTC+8 并转换为 UTC
pub fn from_cn_naive(naive: NaiveDateTime) -> DateTime<Utc> {
    let utc_naive = naive - Duration::seconds(i64::from(CN_OFFSET_SECS));
    DateTime::<Utc>::from_naive_utc_and_offset(utc_naive, Utc)
}

/// 交易所本地日期
pub fn trading_date(now: DateTime<Utc>) -> NaiveDate {
    to_cn(now).date_naive()
}

pub fn is_weekday_date(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_weekday(now: DateTime<Utc>) -> bool {
    is_weekday_date(trading_date(now))
}

/// 本地时钟是否已到达 `hour:minute`
pub fn local_time_reached(now: DateTime<Utc>, hour: u32, minute: u32) -> bool {
    to_cn(now).time() >= hm(hour, minute)
}

/// # Summary
/// 判断当前时刻是否处于允许报单的连续竞价时段。
///
/// # Logic
/// 两段时段均为闭区间：09:30-11:30、13:00-14:57 (尾盘集合竞价不接单)。
pub fn is_order_session(now: DateTime<Utc>) -> bool {
    if !is_weekday(now) {
        return false;
    }
    let t = to_cn(now).time();
    (hm(9, 30) <= t && t <= hm(11, 30)) || (hm(13, 0) <= t && t <= hm(14, 57))
}

/// # Summary
/// 计算某周期在一个交易日内的全部 bar 结束时间 (本地时钟)。
///
/// # Logic
/// 1. 日线只有 15:00 一个收盘点。
/// 2. 日内周期从上午 09:30、下午 13:00 开盘起按固定步长累加，
///    分别截止于 11:30 与 15:00。午间休市不产生 bar，60 分钟周期因此为
///    10:30 / 11:30 / 14:00 / 15:00。
pub fn bar_ends(timeframe: TimeFrame) -> Vec<NaiveTime> {
    let Some(step) = timeframe.intraday_minutes() else {
        return vec![hm(15, 0)];
    };
    let step = Duration::minutes(i64::from(step));

    let mut ends = Vec::new();
    for (open, close) in [(hm(9, 30), hm(11, 30)), (hm(13, 0), hm(15, 0))] {
        let mut t = open + step;
        while t <= close {
            ends.push(t);
            t += step;
        }
    }
    ends
}

/// # Summary
/// 计算截至 `now` 最近一根已完整走完的 bar 的结束时间。
///
/// # Logic
/// 1. 若今天是工作日，取今天所有 ≤ 当前本地时间的 bar 结束点中最晚的一个。
/// 2. 若今天尚无完成的 bar (开盘前或周末)，回溯到上一个工作日的最后一个 bar。
pub fn last_complete_bar_end(now: DateTime<Utc>, timeframe: TimeFrame) -> DateTime<Utc> {
    let ends = bar_ends(timeframe);
    let local = to_cn(now);
    let mut date = local.date_naive();

    if is_weekday_date(date)
        && let Some(end) = ends.iter().rev().find(|end| **end <= local.time())
    {
        return cn_datetime(date, *end);
    }

    let last_end = ends.last().copied().unwrap_or_else(|| hm(15, 0));
    loop {
        let Some(prev) = date.pred_opt() else {
            return cn_datetime(date, last_end);
        };
        date = prev;
        if is_weekday_date(date) {
            return cn_datetime(date, last_end);
        }
    }
}
