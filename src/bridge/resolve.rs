//! Outbound call resolution chain
//!
//! A bare name may be a function or an expression that yields a callable
//! object, so the chain tries, in order:
//!
//! 1. invoke the name as a method of the global object
//! 2. evaluate `(name)` against the global object; anything but an object
//!    fails the call
//! 3. invoke the evaluated object's default function; on failure the
//!    evaluated object itself is the result
//!
//! Runs on the designated thread only.

use std::sync::Arc;

use crate::error::ResolveError;
use crate::host::{HostAdapter, NativeId, NativeObject, NativeVariant, RawVariant};

/// Resolve and run an outbound call
pub fn resolve(
    host: &Arc<dyn HostAdapter>,
    id: NativeId,
    script: &str,
    args: &[RawVariant],
) -> Result<NativeVariant, ResolveError> {
    let global = host
        .global_object()
        .map(|handle| NativeObject::adopt(host, handle))
        .ok_or(ResolveError::NoGlobalObject)?;

    if let Some(raw) = host.invoke(global.handle(), id, args) {
        return Ok(NativeVariant::adopt(host, raw));
    }
    log::trace!("direct invoke failed, evaluating {}", script);

    let evaluated = host
        .evaluate(global.handle(), script)
        .map(|raw| NativeVariant::adopt(host, raw))
        .ok_or_else(|| ResolveError::Evaluate {
            script: script.to_owned(),
        })?;

    let NativeVariant::Object(target) = &evaluated else {
        return Err(ResolveError::NotAnObject {
            script: script.to_owned(),
            kind: evaluated.kind(),
        });
    };

    match host.invoke_default(target.handle(), args) {
        // Dropping `evaluated` releases the intermediate object
        Some(raw) => Ok(NativeVariant::adopt(host, raw)),
        None => {
            log::trace!("{} is not callable, returning it as the result", script);
            Ok(evaluated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    fn run(memory: &Arc<MemoryHost>, name: &str, args: &[RawVariant]) -> Result<NativeVariant, ResolveError> {
        let name = name.to_string();
        let args = args.to_vec();
        memory
            .enter(move |memory| {
                let host: Arc<dyn HostAdapter> = memory.clone();
                let id = host.string_identifier(&name);
                resolve(&host, id, &format!("({})", name), &args)
            })
            .unwrap()
    }

    #[test]
    fn test_direct_invoke() {
        let memory = MemoryHost::new();
        let f = memory.create_function(|args| Some(RawVariant::Int32(args.len() as i32)));
        memory.define_global("count", RawVariant::Object(f));

        let result = run(&memory, "count", &[RawVariant::Null, RawVariant::Null]).unwrap();
        assert_eq!(result, NativeVariant::Int32(2));
    }

    #[test]
    fn test_evaluate_then_default_invoke() {
        let memory = MemoryHost::new();
        let f = memory.create_function(|_| Some(RawVariant::String("called".to_string())));
        memory.define_expression("foo", RawVariant::Object(f));
        memory.release(f);
        let releases_before = memory.release_count(f);

        let result = run(&memory, "foo", &[]).unwrap();
        assert_eq!(result, NativeVariant::String("called".into()));
        assert_eq!(memory.release_count(f), releases_before + 1);
        assert_eq!(memory.ref_count(f), 1, "only the expression table holds it");
    }

    #[test]
    fn test_evaluate_plain_object_is_result() {
        let memory = MemoryHost::new();
        let obj = memory.create_object();
        memory.define_expression("settings", RawVariant::Object(obj));

        let result = run(&memory, "settings", &[]).unwrap();
        assert_eq!(result.as_object().map(NativeObject::handle), Some(obj));
    }

    #[test]
    fn test_evaluate_non_object_fails() {
        let memory = MemoryHost::new();
        memory.define_expression("n", RawVariant::Int32(3));

        let err = run(&memory, "n", &[]).unwrap_err();
        assert!(matches!(err, ResolveError::NotAnObject { .. }));
    }

    #[test]
    fn test_unknown_name_fails() {
        let memory = MemoryHost::new();
        let err = run(&memory, "nothing", &[]).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Evaluate {
                script: "(nothing)".to_string()
            }
        );
    }
}
