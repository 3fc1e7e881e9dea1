// Adapter over a host KV binding
//
// The binding is a JS object with promise-returning methods:
//   get(key)                          -> string | null
//   put(key, value, {expirationTtl})  -> undefined
//   list({prefix, limit, cursor})     -> {keys: [{name, expiration?}], list_complete, cursor?}

use async_trait::async_trait;
use js_sys::{Function, Object, Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use super::{KvNamespace, ListOptions, ListResult, PutOptions};
use crate::browser;
use crate::error::{FingerprintError, Result};

/// [`KvNamespace`] backed by a host binding object
#[derive(Clone)]
pub struct JsKv {
    binding: JsValue,
}

impl JsKv {
    pub fn new(binding: JsValue) -> Self {
        Self { binding }
    }

    /// Look up the binding `name` on the host `env` object
    pub fn from_env(env: &JsValue, name: &str) -> Option<Self> {
        browser::prop(env, name)
            .filter(|binding| binding.is_object())
            .map(Self::new)
    }

    async fn call(&self, method: &str, args: &[JsValue]) -> Result<JsValue> {
        let function: Function = Reflect::get(&self.binding, &JsValue::from_str(method))
            .ok()
            .and_then(|f| f.dyn_into().ok())
            .ok_or_else(|| FingerprintError::Storage(format!("binding has no {}()", method)))?;

        let returned = match args {
            [a] => function.call1(&self.binding, a),
            [a, b] => function.call2(&self.binding, a, b),
            [a, b, c] => function.call3(&self.binding, a, b, c),
            _ => function.call0(&self.binding),
        }
        .map_err(|e| storage_error(method, e))?;

        JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| storage_error(method, e))
    }
}

fn storage_error(method: &str, err: JsValue) -> FingerprintError {
    FingerprintError::Storage(format!("{} failed: {:?}", method, err))
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<()> {
    Reflect::set(target, &JsValue::from_str(key), value)
        .map(|_| ())
        .map_err(|e| FingerprintError::Internal(format!("{:?}", e)))
}

#[async_trait(?Send)]
impl KvNamespace for JsKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.call("get", &[JsValue::from_str(key)]).await?;
        Ok(value.as_string())
    }

    async fn put(&self, key: &str, value: &str, options: PutOptions) -> Result<()> {
        let opts = Object::new();
        if let Some(ttl) = options.expiration_ttl {
            set(&opts, "expirationTtl", &JsValue::from_f64(ttl as f64))?;
        }
        self.call(
            "put",
            &[JsValue::from_str(key), JsValue::from_str(value), opts.into()],
        )
        .await?;
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListResult> {
        let opts = Object::new();
        set(&opts, "limit", &JsValue::from_f64(options.effective_limit() as f64))?;
        if let Some(prefix) = options.prefix.as_deref() {
            set(&opts, "prefix", &JsValue::from_str(prefix))?;
        }
        if let Some(cursor) = options.cursor.as_deref().filter(|c| !c.is_empty()) {
            set(&opts, "cursor", &JsValue::from_str(cursor))?;
        }

        let value = self.call("list", &[opts.into()]).await?;
        let mut result: ListResult = serde_wasm_bindgen::from_value(value)
            .map_err(|e| FingerprintError::Storage(format!("list result: {}", e)))?;
        if result.list_complete || result.cursor.as_deref() == Some("") {
            result.cursor = None;
        }
        Ok(result)
    }
}
