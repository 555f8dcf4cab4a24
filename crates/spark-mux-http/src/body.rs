use crate::ExchangeError;
use bytes::Bytes;
use http::Response;
use http_body_util::BodyExt;
use hyper::body::Incoming;

/// 读完响应体并返回全部字节；读取过程中的失败归为 [`ExchangeError::Read`]。
pub async fn read_response_body(response: Response<Incoming>) -> Result<Bytes, ExchangeError> {
    let collected = response
        .into_body()
        .collect()
        .await
        .map_err(ExchangeError::Read)?;
    Ok(collected.to_bytes())
}
