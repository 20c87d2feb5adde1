//! Request encoding for upstream calls.
//!
//! # Responsibilities
//! - Turn typed request records into query strings or JSON bodies
//! - Apply request-context data: Authorization header, token, path rewrite
//!
//! # Design Decisions
//! - Query encoding goes through [`QueryFields`], so only scalar field kinds
//!   (strings, integers, booleans, 32-bit floats) are representable
//! - Records opt into custom headers by implementing [`Headerer`]
//! - When a gateway prefix is set the stripped inbound path replaces the
//!   configured route

use std::fmt;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use url::Url;

use super::error::DispatchError;
use super::transport::UpstreamRequest;
use crate::http::context::{RequestContext, ACCESS_TOKEN, X_REQUEST_ID};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Scalar value of a query field.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    Uint(u64),
    Bool(bool),
    Float(f32),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Str(s) => f.write_str(s),
            QueryValue::Int(n) => write!(f, "{}", n),
            QueryValue::Uint(n) => write!(f, "{}", n),
            QueryValue::Bool(b) => write!(f, "{}", b),
            // Display prints the shortest representation that round-trips.
            QueryValue::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        QueryValue::Str(v.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        QueryValue::Str(v)
    }
}

impl From<&String> for QueryValue {
    fn from(v: &String) -> Self {
        QueryValue::Str(v.clone())
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        QueryValue::Bool(v)
    }
}

impl From<f32> for QueryValue {
    fn from(v: f32) -> Self {
        QueryValue::Float(v)
    }
}

impl From<i8> for QueryValue {
    fn from(v: i8) -> Self {
        QueryValue::Int(v.into())
    }
}

impl From<i16> for QueryValue {
    fn from(v: i16) -> Self {
        QueryValue::Int(v.into())
    }
}

impl From<i32> for QueryValue {
    fn from(v: i32) -> Self {
        QueryValue::Int(v.into())
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        QueryValue::Int(v)
    }
}

impl From<u8> for QueryValue {
    fn from(v: u8) -> Self {
        QueryValue::Uint(v.into())
    }
}

impl From<u16> for QueryValue {
    fn from(v: u16) -> Self {
        QueryValue::Uint(v.into())
    }
}

impl From<u32> for QueryValue {
    fn from(v: u32) -> Self {
        QueryValue::Uint(v.into())
    }
}

impl From<u64> for QueryValue {
    fn from(v: u64) -> Self {
        QueryValue::Uint(v)
    }
}

/// Request records that can be sent as a query string.
pub trait QueryFields {
    /// `(name, value)` pairs in the order they should appear.
    fn query_fields(&self) -> Vec<(&'static str, QueryValue)>;
}

/// Request records that contribute their own HTTP headers.
pub trait Headerer {
    fn headers(&self) -> HeaderMap;
}

/// Encoded request, independent of which instance it is sent to.
#[derive(Debug, Clone, Default)]
pub struct EncodedRequest {
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl EncodedRequest {
    /// Query-string encoding of a typed record.
    pub fn from_query<R: QueryFields + ?Sized>(request: &R) -> Self {
        let query = request
            .query_fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self {
            query,
            ..Self::default()
        }
    }

    /// Query-string encoding of raw pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            query: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            ..Self::default()
        }
    }

    /// JSON body encoding.
    pub fn from_json<R: Serialize + ?Sized>(request: &R) -> Result<Self, DispatchError> {
        let body = serde_json::to_vec(request).map_err(|e| DispatchError::Encode(e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(JSON_CONTENT_TYPE),
        );
        Ok(Self {
            query: Vec::new(),
            headers,
            body: Some(body),
        })
    }

    /// JSON body encoding that also copies the record's own headers.
    pub fn from_json_with_headers<R>(request: &R) -> Result<Self, DispatchError>
    where
        R: Serialize + Headerer + ?Sized,
    {
        let mut encoded = Self::from_json(request)?;
        for (name, value) in request.headers().iter() {
            encoded.headers.insert(name.clone(), value.clone());
        }
        Ok(encoded)
    }

    /// Materialize the request for one instance.
    pub fn to_upstream(
        &self,
        method: &Method,
        base: &Url,
        route: &str,
        ctx: &RequestContext,
    ) -> UpstreamRequest {
        let mut url = base.clone();
        url.set_path(ctx.upstream_path().unwrap_or(route));

        let mut query: Vec<(&str, &str)> = self
            .query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        if let Some(token) = ctx.access_token.as_deref() {
            query.retain(|(k, _)| *k != ACCESS_TOKEN);
            query.push((ACCESS_TOKEN, token));
        }
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(query);
        }

        let mut headers = self.headers.clone();
        if let Some(value) = ctx
            .authorization
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(header::AUTHORIZATION, value);
        }
        if let Some(value) = ctx
            .request_id
            .as_deref()
            .and_then(|v| HeaderValue::from_str(v).ok())
        {
            headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
        }

        UpstreamRequest {
            method: method.clone(),
            url,
            headers,
            body: self.body.clone(),
        }
    }
}
