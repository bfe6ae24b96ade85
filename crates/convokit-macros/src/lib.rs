#![deny(unsafe_code)]

//! Procedural macros for Convokit.
//!
//! - `#[derive(Component)]`: implement `ComponentClass` from a
//!   `#[component(...)]` attribute, so a type's metadata lives next to it.

extern crate proc_macro;

mod component;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derive `convokit_core::ComponentClass`.
///
/// The type must also implement `CustomComponent` and `Default`.
///
/// Supported keys inside `#[component(...)]`:
/// - `name = "..."`: component name (defaults to the lowercased type name)
/// - `supported_actions = ["a", "b"]`: transition actions
/// - `property(name = "...", kind = "...", required)`: a declared property;
///   repeat for each property
///
/// # Example
///
/// ```ignore
/// use convokit_macros::Component;
///
/// #[derive(Default, Component)]
/// #[component(
///     name = "greeting",
///     supported_actions = ["done"],
///     property(name = "who", kind = "string", required)
/// )]
/// struct Greeting;
/// ```
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    component::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
