pub mod webservice_reconciler;

use crate::config::ControllerConfig;
use crate::executable_model::SimulatedApiServer;
use crate::kubernetes_api::{APIError, ApiServer, KubeObject};
use crate::podset_types::*;
use crate::reconciler::Data;
use crate::webservice_types::*;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use std::sync::atomic::{AtomicBool, Ordering};

pub const NAMESPACE: &str = "default";

pub fn new_data() -> Data<SimulatedApiServer> {
    Data {
        api: SimulatedApiServer::new(),
        config: ControllerConfig::default(),
    }
}

pub fn podset(name: &str, replicas: i32) -> PodSet {
    let mut ps = PodSet::new(
        name,
        PodSetSpec {
            replicas,
            port: 6379,
            image: DEFAULT_POD_IMAGE.to_string(),
        },
    );
    ps.metadata.namespace = Some(NAMESPACE.to_string());
    ps
}

pub fn tier(name: &str, image: &str, port: i32, target_port: Option<i32>) -> TierSpec {
    TierSpec {
        name: name.to_string(),
        image: image.to_string(),
        size: Some(1),
        resources: None,
        ports: vec![corev1::ServicePort {
            name: Some(name.to_string()),
            port,
            target_port: target_port.map(IntOrString::Int),
            protocol: Some("TCP".to_string()),
            ..corev1::ServicePort::default()
        }],
        envs: None,
        service_type: None,
    }
}

pub fn webservice(name: &str) -> WebService {
    let mut ws = WebService::new(
        name,
        WebServiceSpec {
            database: tier("mysql", "mysql:5.7", 3306, None),
            frontend: tier("web", "nginx:1.25", 80, Some(8080)),
        },
    );
    ws.metadata.namespace = Some(NAMESPACE.to_string());
    ws
}

/// Creates `ps` on the simulated server and forgets the request.
pub async fn seed_podset(data: &Data<SimulatedApiServer>, ps: &PodSet) -> PodSet {
    let created = data.api.create(NAMESPACE, ps).await.unwrap();
    data.api.clear_requests();
    created
}

pub async fn seed_webservice(data: &Data<SimulatedApiServer>, ws: &WebService) -> WebService {
    let created = data.api.create(NAMESPACE, ws).await.unwrap();
    data.api.clear_requests();
    created
}

/// ConcurrentWriter stands in for another client writing the same object.
/// Once armed, the next read of `kind` is followed by an unrelated write to
/// that object, so whatever the reader replaces next carries a stale resourceVersion.
pub struct ConcurrentWriter {
    pub inner: SimulatedApiServer,
    kind: &'static str,
    armed: AtomicBool,
}

impl ConcurrentWriter {
    pub fn new(kind: &'static str) -> ConcurrentWriter {
        ConcurrentWriter {
            inner: SimulatedApiServer::new(),
            kind,
            armed: AtomicBool::new(false),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApiServer for ConcurrentWriter {
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K, APIError> {
        let obj = self.inner.get::<K>(namespace, name).await?;
        if K::kind(&()) == self.kind && self.armed.swap(false, Ordering::SeqCst) {
            let mut touched = obj.clone();
            touched
                .meta_mut()
                .labels
                .get_or_insert_with(Default::default)
                .insert("touched-by".to_string(), "someone-else".to_string());
            self.inner.replace(namespace, &touched).await?;
        }
        Ok(obj)
    }

    async fn create<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        self.inner.create(namespace, obj).await
    }

    async fn replace<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        self.inner.replace(namespace, obj).await
    }

    async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), APIError> {
        self.inner.delete::<K>(namespace, name).await
    }
}

pub fn concurrent_data(kind: &'static str) -> Data<ConcurrentWriter> {
    Data {
        api: ConcurrentWriter::new(kind),
        config: ControllerConfig::default(),
    }
}
