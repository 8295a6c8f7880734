use anyhow::Result;
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::TryFrom;

use crate::binding::BoundArguments;
use crate::dispatcher::ReturnValue;
use crate::error::ClientError;
use crate::mapping::{HandlerMethod, HandlerRef, RouteBuilder};
use crate::request::RequestContext;

/// Handler with a typed request and a serializable response.
///
/// The request type is built from the route's bound arguments with
/// `TryFrom`; the response is written through content negotiation like
/// any other body value.
pub trait Handler: Send + Sync + 'static {
    /// The typed request type (converted from the bound arguments)
    type Request: TryFrom<BoundArguments, Error = anyhow::Error> + Send + 'static;
    /// The typed response type (serialized to JSON)
    type Response: Serialize + Send + 'static;

    /// # Errors
    ///
    /// A [`ClientError`] for bad input; anything else is reported as a 500.
    fn handle(&self, req: TypedHandlerRequest<Self::Request>) -> Result<Self::Response>;
}

/// Typed request data passed to a [`Handler`].
#[derive(Debug, Clone)]
pub struct TypedHandlerRequest<T> {
    pub method: Method,
    pub path: String,
    pub handler_name: String,
    /// First value of each query/form parameter
    pub query_params: HashMap<String, String>,
    pub data: T,
}

/// Deserialize the whole argument set, keyed by parameter name.
///
/// Convenient inside a `TryFrom<BoundArguments>` impl when the request type
/// mirrors the route's parameters.
///
/// # Errors
///
/// A [`ClientError`] naming the first field that does not fit.
pub fn from_arguments<T: DeserializeOwned>(args: &BoundArguments) -> Result<T> {
    serde_json::from_value(args.to_json())
        .map_err(|e| ClientError::bad_request(format!("Invalid request data: {e}")).into())
}

/// Adapts a [`Handler`] to the untyped handler interface.
pub struct TypedHandler<H> {
    name: String,
    handler: H,
}

impl<H: Handler> TypedHandler<H> {
    #[must_use]
    pub fn new(name: &str, handler: H) -> Self {
        Self {
            name: name.to_string(),
            handler,
        }
    }

    #[must_use]
    pub fn into_ref(self) -> HandlerRef {
        let name = self.name.clone();
        HandlerRef::from_method(&name, self)
    }
}

impl<H: Handler> HandlerMethod for TypedHandler<H> {
    fn invoke(&self, args: BoundArguments, request: &RequestContext) -> Result<ReturnValue> {
        let data = H::Request::try_from(args).map_err(|e| {
            if e.chain().any(|c| c.is::<ClientError>() || c.is::<crate::error::BindingError>()) {
                e
            } else {
                ClientError::bad_request(format!("Invalid request data: {e}")).into()
            }
        })?;

        let mut query_params = HashMap::new();
        for (k, v) in request.all_params() {
            query_params.entry(k.to_string()).or_insert_with(|| v.to_string());
        }
        let typed_req = TypedHandlerRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            handler_name: self.name.clone(),
            query_params,
            data,
        };

        let response = self.handler.handle(typed_req)?;
        ReturnValue::body(&response)
    }
}

impl RouteBuilder {
    /// Bind a typed handler.
    #[must_use]
    pub fn typed_handler<H: Handler>(self, name: &str, handler: H) -> Self {
        self.handler_ref(TypedHandler::new(name, handler).into_ref())
    }
}
