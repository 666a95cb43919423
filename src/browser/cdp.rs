use crate::axtree::AxNode;
use crate::dom::DomSnapshot;
use crate::error::{BrowserError, Result};
use crate::page::{FrameOwner, FrameTree, PageDriver, SnapshotParams};
use base64::Engine;
use headless_chrome::Tab;
use headless_chrome::protocol::cdp::types::Method;
use headless_chrome::protocol::cdp::{Accessibility, DOM, DOMSnapshot, Page, Runtime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Name of the isolated world the injected scripts run in
const WORLD_NAME: &str = "browser_observe";

/// Build a protocol command from its JSON parameters
fn command<T: DeserializeOwned>(method: &str, params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| BrowserError::Protocol(format!("{} params: {}", method, e)))
}

/// Re-read a protocol reply through our own wire types
fn reply<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| BrowserError::Protocol(format!("{} reply: {}", method, e)))
}

/// Run a blocking call on a worker thread and give up on it after `timeout`.
///
/// `Tab::call_method` only returns once the transport gives up, which is the
/// browser's idle timeout. A call that overruns is abandoned; its worker exits
/// whenever the transport finally answers.
fn with_deadline<T, F>(method: &'static str, timeout: Duration, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name(format!("cdp {}", method))
        .spawn(move || {
            let _ = tx.send(call());
        })
        .map_err(|e| BrowserError::CdpCallFailed { method: method.to_string(), reason: e.to_string() })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(BrowserError::Timeout {
            method: method.to_string(),
            reason: format!("no reply within {} ms", timeout.as_millis()),
        }),
        Err(RecvTimeoutError::Disconnected) => Err(BrowserError::CdpCallFailed {
            method: method.to_string(),
            reason: "call worker exited without a reply".to_string(),
        }),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameTreeReply {
    frame_tree: FrameTree,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IsolatedWorldReply {
    execution_context_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameOwnerReply {
    backend_node_id: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribedNode {
    #[serde(default)]
    node_name: String,
    #[serde(default)]
    attributes: Option<Vec<String>>,
    #[serde(default)]
    frame_id: Option<String>,
}

#[derive(Deserialize)]
struct DescribeNodeReply {
    node: DescribedNode,
}

#[derive(Deserialize)]
struct RemoteValue {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct ExceptionReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    exception: Option<RemoteValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallFunctionReply {
    result: RemoteValue,
    #[serde(default)]
    exception_details: Option<ExceptionReply>,
}

#[derive(Deserialize)]
struct AxTreeReply {
    #[serde(default)]
    nodes: Vec<AxNode>,
}

#[derive(Deserialize)]
struct ScreenshotReply {
    data: String,
}

/// [`PageDriver`] over a live Chrome tab.
///
/// Scripts run in one isolated world per frame so page scripts cannot
/// interfere with them; the world's context id is cached until the frame's
/// document goes away.
///
/// Every protocol call is bounded by `call_timeout`. The tab's own default
/// timeout is left alone so navigation waits keep their settings.
pub struct CdpPage {
    tab: Arc<Tab>,
    call_timeout: Duration,
    contexts: Mutex<HashMap<String, i64>>,
}

impl CdpPage {
    pub fn new(tab: Arc<Tab>, call_timeout: Duration) -> Result<Self> {
        let page = Self { tab, call_timeout, contexts: Mutex::new(HashMap::new()) };
        let enable: DOM::Enable = command("DOM.enable", json!({}))?;
        page.call("DOM.enable", enable)?;
        Ok(page)
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Send one protocol command and return its reply as JSON
    fn call<C>(&self, method: &'static str, cmd: C) -> Result<Value>
    where
        C: Method + Serialize + Debug + Send + 'static,
        C::ReturnObject: Serialize,
    {
        let tab = Arc::clone(&self.tab);
        with_deadline(method, self.call_timeout, move || {
            let ret = tab.call_method(cmd).map_err(|e| BrowserError::from_cdp(method, e))?;
            Ok(serde_json::to_value(ret)?)
        })
    }

    fn cached_context(&self, frame_id: &str) -> Result<Option<i64>> {
        let contexts = self
            .contexts
            .lock()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Context cache poisoned: {}", e)))?;
        Ok(contexts.get(frame_id).copied())
    }

    fn forget_context(&self, frame_id: &str) {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.remove(frame_id);
        }
    }

    fn execution_context(&self, frame_id: &str) -> Result<i64> {
        if let Some(id) = self.cached_context(frame_id)? {
            return Ok(id);
        }

        const METHOD: &str = "Page.createIsolatedWorld";
        let cmd: Page::CreateIsolatedWorld = command(METHOD, json!({"frameId": frame_id, "worldName": WORLD_NAME}))?;
        let ret = self.call(METHOD, cmd)?;
        let world: IsolatedWorldReply = reply(METHOD, ret)?;

        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.insert(frame_id.to_string(), world.execution_context_id);
        }
        Ok(world.execution_context_id)
    }

    fn describe_node(&self, backend_node_id: i64) -> Result<DescribedNode> {
        const METHOD: &str = "DOM.describeNode";
        let cmd: DOM::DescribeNode = command(METHOD, json!({"backendNodeId": backend_node_id}))?;
        let ret = self.call(METHOD, cmd)?;
        let described: DescribeNodeReply = reply(METHOD, ret)?;
        Ok(described.node)
    }
}

impl PageDriver for CdpPage {
    fn frame_tree(&self) -> Result<FrameTree> {
        const METHOD: &str = "Page.getFrameTree";
        let ret = self.call(METHOD, Page::GetFrameTree(None))?;
        let tree: FrameTreeReply = reply(METHOD, ret)?;
        Ok(tree.frame_tree)
    }

    fn frame_owner(&self, frame_id: &str) -> Result<FrameOwner> {
        const METHOD: &str = "DOM.getFrameOwner";
        let cmd: DOM::GetFrameOwner = command(METHOD, json!({"frameId": frame_id}))?;
        let ret = self.call(METHOD, cmd)?;
        let owner: FrameOwnerReply = reply(METHOD, ret)?;

        let node = self.describe_node(owner.backend_node_id)?;
        Ok(FrameOwner::from_flat_attributes(
            owner.backend_node_id,
            node.node_name,
            &node.attributes.unwrap_or_default(),
            node.frame_id,
        ))
    }

    fn call_function(&self, frame_id: &str, function: &str, args: &[Value]) -> Result<Value> {
        const METHOD: &str = "Runtime.callFunctionOn";
        let context_id = self.execution_context(frame_id)?;
        let arguments: Vec<Value> = args.iter().map(|value| json!({"value": value})).collect();
        let cmd: Runtime::CallFunctionOn = command(
            METHOD,
            json!({
                "functionDeclaration": function,
                "executionContextId": context_id,
                "arguments": arguments,
                "returnByValue": true,
                "awaitPromise": true,
            }),
        )?;

        let ret = match self.call(METHOD, cmd) {
            Ok(ret) => ret,
            Err(err) => {
                if err.is_frame_lifecycle() {
                    self.forget_context(frame_id);
                }
                return Err(err);
            }
        };

        let call: CallFunctionReply = reply(METHOD, ret)?;
        if let Some(details) = call.exception_details {
            let reason = details.exception.and_then(|e| e.description).unwrap_or(details.text);
            let err = BrowserError::from_script(frame_id, reason);
            if err.is_frame_lifecycle() {
                self.forget_context(frame_id);
            }
            return Err(err);
        }
        Ok(call.result.value.unwrap_or(Value::Null))
    }

    fn capture_snapshot(&self, params: &SnapshotParams) -> Result<DomSnapshot> {
        const METHOD: &str = "DOMSnapshot.captureSnapshot";
        let cmd: DOMSnapshot::CaptureSnapshot = command(METHOD, serde_json::to_value(params)?)?;
        let ret = self.call(METHOD, cmd)?;
        reply(METHOD, ret).map_err(|e| BrowserError::MalformedSnapshot(e.to_string()))
    }

    fn full_ax_tree(&self, frame_id: &str) -> Result<Vec<AxNode>> {
        const METHOD: &str = "Accessibility.getFullAXTree";
        let cmd: Accessibility::GetFullAXTree = command(METHOD, json!({"frameId": frame_id}))?;
        let ret = self.call(METHOD, cmd)?;
        let tree: AxTreeReply = reply(METHOD, ret)?;
        Ok(tree.nodes)
    }

    fn describe_node_frame(&self, backend_node_id: i64) -> Result<Option<String>> {
        Ok(self.describe_node(backend_node_id)?.frame_id)
    }

    fn capture_screenshot(&self) -> Result<Vec<u8>> {
        const METHOD: &str = "Page.captureScreenshot";
        let cmd: Page::CaptureScreenshot = command(METHOD, json!({"format": "png"}))?;
        let ret = self.call(METHOD, cmd)?;
        let shot: ScreenshotReply = reply(METHOD, ret)?;
        base64::engine::general_purpose::STANDARD
            .decode(shot.data)
            .map_err(|e| BrowserError::ScreenshotFailed(format!("Invalid base64 payload: {}", e)))
    }
}
