use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderValue, Request, Response, StatusCode, header::CONTENT_TYPE};
use http_body_util::Full;
use hyper::body::Incoming;
use std::{collections::HashMap, fmt, future::Future};

/// 处理器返回的 Future。
pub type HandlerFuture = BoxFuture<'static, Response<Full<Bytes>>>;

/// 应用侧请求处理入口。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 会话服务只负责把每条逻辑流交给 HTTP/1 连接服务，具体的路由与业务逻辑由实现方决定；
/// - 任何 `Fn(Request<Incoming>) -> impl Future<Output = Response<_>>` 闭包都自动满足本 trait。
///
/// ## 契约 (What)
/// - 处理器总是产出一个响应；错误应由实现方映射为相应的状态码；
/// - 实现必须满足 `Send + Sync + 'static`，同一实例被所有会话与逻辑流共享。
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request<Incoming>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    fn handle(&self, request: Request<Incoming>) -> HandlerFuture {
        Box::pin(self(request))
    }
}

/// 按路径精确匹配的路由表，未命中时返回 404。
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Box<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 `path` 的处理器；重复注册时后者覆盖前者。
    pub fn route(mut self, path: impl Into<String>, handler: impl Handler) -> Self {
        self.routes.insert(path.into(), Box::new(handler));
        self
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Handler for Router {
    fn handle(&self, request: Request<Incoming>) -> HandlerFuture {
        match self.routes.get(request.uri().path()) {
            Some(handler) => handler.handle(request),
            None => Box::pin(async { not_found() }),
        }
    }
}

/// 构造 `text/plain` 响应。
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// 标准 404 响应。
pub fn not_found() -> Response<Full<Bytes>> {
    text_response(StatusCode::NOT_FOUND, "404 page not found\n")
}
