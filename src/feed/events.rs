//! Decoding of exchange stream payloads into [`FeedEvent`]s.
//!
//! Accepts both combined-stream envelopes (`{"stream": .., "data": ..}`) and
//! raw payloads. Kline updates for a still-forming candle become ticks at the
//! running close; a closed kline becomes a [`FeedEvent::CandleClose`].

use serde::Deserialize;

use crate::error::ParseError;
use crate::models::Candle;

/// Typed market data event, the only thing the dispatcher consumes
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Tick {
        symbol: String,
        price: f64,
        event_time: i64,
    },
    CandleClose {
        symbol: String,
        candle: Candle,
    },
}

impl FeedEvent {
    pub fn symbol(&self) -> &str {
        match self {
            FeedEvent::Tick { symbol, .. } | FeedEvent::CandleClose { symbol, .. } => symbol,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Message {
    Combined {
        #[allow(dead_code)]
        stream: String,
        data: Payload,
    },
    Raw(Payload),
    /// Reply to a SUBSCRIBE request
    Ack {
        #[allow(dead_code)]
        id: u64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Many(Vec<RawEvent>),
    One(RawEvent),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
enum RawEvent {
    #[serde(rename = "kline")]
    Kline {
        #[serde(rename = "E")]
        event_time: i64,
        #[serde(rename = "s")]
        symbol: String,
        #[serde(rename = "k")]
        kline: RawKline,
    },
    #[serde(rename = "markPriceUpdate")]
    MarkPrice {
        #[serde(rename = "E")]
        event_time: i64,
        #[serde(rename = "s")]
        symbol: String,
        #[serde(rename = "p")]
        mark_price: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(rename = "t")]
    start_time: i64,
    #[serde(rename = "T")]
    end_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// Decode one text frame. Unsupported event types yield no events.
pub fn decode_message(text: &str) -> Result<Vec<FeedEvent>, ParseError> {
    let message: Message = serde_json::from_str(text)?;
    let payload = match message {
        Message::Combined { data, .. } | Message::Raw(data) => data,
        Message::Ack { .. } => return Ok(Vec::new()),
    };

    let raw_events = match payload {
        Payload::Many(events) => events,
        Payload::One(event) => vec![event],
    };

    let mut events = Vec::with_capacity(raw_events.len());
    for raw in raw_events {
        if let Some(event) = convert(raw)? {
            events.push(event);
        }
    }
    Ok(events)
}

fn convert(raw: RawEvent) -> Result<Option<FeedEvent>, ParseError> {
    match raw {
        RawEvent::Kline {
            event_time,
            symbol,
            kline,
        } => {
            if kline.is_closed {
                let candle = Candle::new(
                    parse_number("open", &kline.open)?,
                    parse_number("high", &kline.high)?,
                    parse_number("low", &kline.low)?,
                    parse_number("close", &kline.close)?,
                    parse_number("volume", &kline.volume)?,
                    kline.start_time,
                    kline.end_time,
                )?;
                Ok(Some(FeedEvent::CandleClose { symbol, candle }))
            } else {
                Ok(Some(FeedEvent::Tick {
                    symbol,
                    price: parse_number("close", &kline.close)?,
                    event_time,
                }))
            }
        }
        RawEvent::MarkPrice {
            event_time,
            symbol,
            mark_price,
        } => Ok(Some(FeedEvent::Tick {
            symbol,
            price: parse_number("mark_price", &mark_price)?,
            event_time,
        })),
        RawEvent::Unsupported => Ok(None),
    }
}

/// Parse a decimal string, rejecting NaN and infinities
pub fn parse_number(field: &'static str, value: &str) -> Result<f64, ParseError> {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ParseError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}
