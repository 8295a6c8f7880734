//! # Typed Module
//!
//! Type-safe handlers: instead of reading [`crate::binding::BoundArguments`]
//! by name, a handler declares a request struct built with
//! `TryFrom<BoundArguments>` and returns a `Serialize` response.
//!
//! ```rust,ignore
//! #[derive(Deserialize)]
//! struct GetPet { id: i64 }
//!
//! impl TryFrom<BoundArguments> for GetPet {
//!     type Error = anyhow::Error;
//!     fn try_from(args: BoundArguments) -> anyhow::Result<Self> {
//!         routebind::typed::from_arguments(&args)
//!     }
//! }
//!
//! let route = RouteDescriptor::builder("/pets/{id}")
//!     .method(Method::GET)
//!     .parameter(ParameterDescriptor::path_variable("id", DeclaredType::Integer))
//!     .typed_handler("get_pet", GetPetHandler)
//!     .build()?;
//! ```
//!
//! Conversion failures become 400 responses; the response value goes
//! through content negotiation like any other body.

mod core;

pub use core::*;
