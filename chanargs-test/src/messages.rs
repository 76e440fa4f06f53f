//! Messages of the `grpc.testing` test service.

/// A payload of zero bytes.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Payload {
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub body: Vec<u8>,
}

impl Payload {
    pub fn zeros(size: usize) -> Self {
        Self {
            r#type: 0,
            body: vec![0; size],
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SimpleRequest {
    #[prost(int32, tag = "1")]
    pub response_type: i32,
    /// Size of the payload in the response.
    #[prost(int32, tag = "2")]
    pub response_size: i32,
    #[prost(message, optional, tag = "3")]
    pub payload: Option<Payload>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SimpleResponse {
    #[prost(message, optional, tag = "1")]
    pub payload: Option<Payload>,
}

/// Shape of one message in a streamed response.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ResponseParameters {
    #[prost(int32, tag = "1")]
    pub size: i32,
    /// Delay before sending the message, in microseconds.
    #[prost(int32, tag = "2")]
    pub interval_us: i32,
}

impl ResponseParameters {
    pub fn size(size: i32) -> Self {
        Self {
            size,
            interval_us: 0,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamingOutputCallRequest {
    #[prost(int32, tag = "1")]
    pub response_type: i32,
    #[prost(message, repeated, tag = "2")]
    pub response_parameters: Vec<ResponseParameters>,
    #[prost(message, optional, tag = "3")]
    pub payload: Option<Payload>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StreamingOutputCallResponse {
    #[prost(message, optional, tag = "1")]
    pub payload: Option<Payload>,
}

impl StreamingOutputCallResponse {
    pub fn body_len(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.body.len())
    }
}
