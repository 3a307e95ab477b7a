//! In-memory API emulator for tests and dry runs.

use super::{Method, Request, Response, Transport};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// A handler for a slice of the API surface.
pub trait Route: Send + Sync {
    /// Answer the request, or `None` when it is not for this route.
    fn handle(&self, request: &Request) -> Option<Response>;
}

impl<F> Route for F
where
    F: Fn(&Request) -> Option<Response> + Send + Sync,
{
    fn handle(&self, request: &Request) -> Option<Response> {
        self(request)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Transport that answers from registered routes.
///
/// Scripted one-shot responses take precedence over routes, which makes it
/// easy to inject throttling or server errors into an otherwise working
/// emulator. Unrouted requests get a 404 with an empty body, as the real
/// API does for unknown objects.
#[derive(Default)]
pub struct MemoryTransport {
    routes: Vec<Arc<dyn Route>>,
    scripted: Mutex<VecDeque<(Method, String, Response)>>,
    log: Mutex<Vec<Request>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route; routes are consulted in registration order.
    pub fn route(mut self, route: impl Route + 'static) -> Self {
        self.routes.push(Arc::new(route));
        self
    }

    /// Register a shared route the caller keeps a handle to.
    pub fn shared_route(mut self, route: Arc<dyn Route>) -> Self {
        self.routes.push(route);
        self
    }

    /// Answer the next matching request with `response`, once.
    ///
    /// `path` matches requests whose path starts with it.
    pub fn script(&self, method: Method, path: impl Into<String>, response: Response) {
        lock(&self.scripted).push_back((method, path.into(), response));
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.log).clone()
    }

    /// Number of requests sent with `method`.
    pub fn count(&self, method: Method) -> usize {
        lock(&self.log).iter().filter(|r| r.method == method).count()
    }

    fn take_scripted(&self, request: &Request) -> Option<Response> {
        let mut scripted = lock(&self.scripted);
        let index = scripted
            .iter()
            .position(|(method, path, _)| *method == request.method && request.path.starts_with(path.as_str()))?;
        scripted.remove(index).map(|(_, _, response)| response)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        lock(&self.log).push(request.clone());
        if let Some(response) = self.take_scripted(&request) {
            return Ok(response);
        }
        let response = self
            .routes
            .iter()
            .find_map(|route| route.handle(&request))
            .unwrap_or_else(Response::not_found);
        log::trace!("memory: {} {} -> {}", request.method, request.path, response.status);
        Ok(response)
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug)]
struct Stored {
    body: Value,
    reads: usize,
    /// Reads left before a deleted object disappears.
    deleting: Option<usize>,
}

#[derive(Debug, Default)]
struct CollectionState {
    objects: BTreeMap<String, Stored>,
    next_id: u32,
}

/// A plain REST collection.
///
/// `POST base` creates, `GET base/{id}` reads, `PUT base/{id}` replaces and
/// `DELETE base/{id}` removes. When a status field is configured, every read
/// after a write reports the next status of the progression, and the last
/// status sticks.
pub struct Collection {
    base: String,
    id_field: &'static str,
    status_field: Option<&'static str>,
    progression: Vec<String>,
    linger: usize,
    state: Mutex<CollectionState>,
}

impl Collection {
    /// A collection at `base` whose objects are named by `id_field`.
    pub fn new(base: impl Into<String>, id_field: &'static str) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            id_field,
            status_field: None,
            progression: Vec::new(),
            linger: 0,
            state: Mutex::new(CollectionState::default()),
        }
    }

    /// Report `statuses` in `field` on successive reads after each write.
    pub fn with_progression(mut self, field: &'static str, statuses: &[&str]) -> Self {
        self.status_field = Some(field);
        self.progression = statuses.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Keep deleted objects readable for `reads` more reads.
    pub fn with_linger(mut self, reads: usize) -> Self {
        self.linger = reads;
        self
    }

    /// Store an object directly, as if it had been created earlier.
    pub fn seed(&self, id: &str, body: Value) {
        lock(&self.state).objects.insert(
            id.to_string(),
            Stored {
                body,
                reads: usize::MAX,
                deleting: None,
            },
        );
    }

    /// The stored body of an object, without counting as a read.
    pub fn stored(&self, id: &str) -> Option<Value> {
        lock(&self.state).objects.get(id).map(|s| s.body.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.state).objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn status_at(&self, reads: usize) -> Option<&str> {
        let last = self.progression.len().checked_sub(1)?;
        self.progression.get(reads.min(last)).map(String::as_str)
    }

    fn render(&self, stored: &Stored) -> Value {
        let mut body = stored.body.clone();
        if let (Some(field), Some(status)) = (self.status_field, self.status_at(stored.reads))
            && let Some(object) = body.as_object_mut()
        {
            object.insert(field.to_string(), Value::String(status.to_string()));
        }
        body
    }

    fn create(&self, body: Option<&Value>) -> Response {
        let mut state = lock(&self.state);
        let mut body = body.cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let id = match body.get(self.id_field).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                state.next_id += 1;
                format!("ID{:04}", state.next_id)
            }
        };
        if state.objects.contains_key(&id) {
            return Response::new(409, format!("{id} already exists"));
        }
        if let Some(object) = body.as_object_mut() {
            object.insert(self.id_field.to_string(), Value::String(id.clone()));
        }
        let stored = Stored {
            body,
            reads: 0,
            deleting: None,
        };
        let rendered = self.render(&stored);
        state.objects.insert(id, stored);
        Response::json(&rendered)
    }

    fn read(&self, id: &str) -> Response {
        let mut state = lock(&self.state);
        let Some(stored) = state.objects.get_mut(id) else {
            return Response::not_found();
        };
        if let Some(left) = stored.deleting {
            if left == 0 {
                state.objects.remove(id);
                return Response::not_found();
            }
            stored.deleting = Some(left - 1);
        }
        let rendered = self.render(stored);
        stored.reads = stored.reads.saturating_add(1);
        Response::json(&rendered)
    }

    fn replace(&self, id: &str, body: Option<&Value>) -> Response {
        let mut state = lock(&self.state);
        let Some(stored) = state.objects.get_mut(id) else {
            return Response::not_found();
        };
        let mut body = body.cloned().unwrap_or(Value::Null);
        if let Some(object) = body.as_object_mut() {
            object.insert(self.id_field.to_string(), Value::String(id.to_string()));
        }
        stored.body = body;
        stored.reads = 0;
        Response::new(200, "")
    }

    fn remove(&self, id: &str) -> Response {
        let mut state = lock(&self.state);
        let Some(stored) = state.objects.get_mut(id) else {
            return Response::not_found();
        };
        if self.linger == 0 {
            state.objects.remove(id);
        } else {
            stored.deleting.get_or_insert(self.linger);
        }
        Response::new(204, "")
    }
}

impl Route for Collection {
    fn handle(&self, request: &Request) -> Option<Response> {
        let rest = request.path.strip_prefix(self.base.as_str())?;
        let id = match rest {
            "" => None,
            other => {
                let id = other.strip_prefix('/')?;
                if id.is_empty() || id.contains('/') {
                    return None;
                }
                Some(id)
            }
        };
        match (request.method, id) {
            (Method::Post, None) => Some(self.create(request.body.as_ref())),
            (Method::Get, None) => {
                let state = lock(&self.state);
                let all: Vec<Value> = state.objects.values().map(|s| self.render(s)).collect();
                Some(Response::json(&Value::Array(all)))
            }
            (Method::Get, Some(id)) => Some(self.read(id)),
            (Method::Put, Some(id)) => Some(self.replace(id, request.body.as_ref())),
            (Method::Delete, Some(id)) => Some(self.remove(id)),
            _ => Some(Response::new(405, "method not allowed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "v3/subscriptions/t-1/azure/cosmosDb/account";

    async fn send(transport: &MemoryTransport, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut request = Request::new(method, path);
        request.body = body;
        transport.send(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_unrouted_request_is_not_found() {
        let transport = MemoryTransport::new();
        let response = send(&transport, Method::Get, "v3/anything", None).await;
        assert_eq!(response.status, 404);
        assert!(response.is_empty_body());
        assert_eq!(transport.count(Method::Get), 1);
    }

    #[tokio::test]
    async fn test_scripted_response_is_used_once() {
        let transport = MemoryTransport::new().route(|_: &Request| Some(Response::new(200, "{}")));
        transport.script(Method::Get, "v3/", Response::new(400, "Rate exceeded"));

        assert_eq!(send(&transport, Method::Get, "v3/x", None).await.status, 400);
        assert_eq!(send(&transport, Method::Get, "v3/x", None).await.status, 200);
    }

    #[tokio::test]
    async fn test_collection_crud_with_progression() {
        let accounts = Arc::new(
            Collection::new(BASE, "name").with_progression("provisioningState", &["Creating", "Succeeded"]),
        );
        let transport = MemoryTransport::new().shared_route(accounts.clone());

        let created = send(&transport, Method::Post, BASE, Some(json!({"name": "orders"}))).await;
        assert_eq!(created.status, 200);

        let path = format!("{BASE}/orders");
        let first: Value = serde_json::from_str(&send(&transport, Method::Get, &path, None).await.body).unwrap();
        assert_eq!(first["provisioningState"], "Creating");
        let second: Value = serde_json::from_str(&send(&transport, Method::Get, &path, None).await.body).unwrap();
        assert_eq!(second["provisioningState"], "Succeeded");

        let put = send(&transport, Method::Put, &path, Some(json!({"kind": "MongoDB"}))).await;
        assert_eq!(put.status, 200);
        assert_eq!(accounts.stored("orders").unwrap()["kind"], "MongoDB");

        assert_eq!(send(&transport, Method::Delete, &path, None).await.status, 204);
        assert_eq!(send(&transport, Method::Get, &path, None).await.status, 404);
        assert!(accounts.is_empty());
    }

    #[tokio::test]
    async fn test_collection_generates_ids_and_rejects_duplicates() {
        let items = Collection::new("v3/items", "Id");
        let transport = MemoryTransport::new().route(items);

        let created: Value =
            serde_json::from_str(&send(&transport, Method::Post, "v3/items", Some(json!({}))).await.body).unwrap();
        assert_eq!(created["Id"], "ID0001");

        let duplicate = send(&transport, Method::Post, "v3/items", Some(json!({"Id": "ID0001"}))).await;
        assert_eq!(duplicate.status, 409);
    }

    #[tokio::test]
    async fn test_collection_linger_after_delete() {
        let transport = MemoryTransport::new().route(Collection::new("v3/items", "Id").with_linger(2));
        send(&transport, Method::Post, "v3/items", Some(json!({"Id": "a"}))).await;
        send(&transport, Method::Delete, "v3/items/a", None).await;

        assert_eq!(send(&transport, Method::Get, "v3/items/a", None).await.status, 200);
        assert_eq!(send(&transport, Method::Get, "v3/items/a", None).await.status, 200);
        assert_eq!(send(&transport, Method::Get, "v3/items/a", None).await.status, 404);
    }
}
