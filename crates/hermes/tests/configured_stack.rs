//! A client and server assembled from configuration.

use hermes::config::ConfigLoader;
use hermes::prelude::*;
use hermes_test::{add_numbers_port, AddNumbersEndpoint, EventLog, ScriptedHandler};
use serde_json::json;

const CONFIG: &str = r#"
[server]
expose_error_chain = true

[dispatch]
pivot_reentry = "skip"

[[handler_chains]]
port_name_pattern = "{http://duke.example.org}AddNumbersPort"

[[handler_chains.handlers]]
name = "ServerProtocol"

[[handler_chains.handlers]]
name = "ServerLogical"
"#;

fn configured() -> HermesConfig {
    ConfigLoader::new()
        .with_string(CONFIG, "toml")
        .unwrap()
        .load()
        .unwrap()
}

#[tokio::test]
async fn test_configured_server_round_trip() {
    let config = configured();
    let log = EventLog::new();
    let registry = HandlerRegistry::new();
    registry.register_prototype("ServerProtocol", ScriptedHandler::protocol("ServerProtocol", &log));
    registry.register_prototype("ServerLogical", ScriptedHandler::logical("ServerLogical", &log));

    let runtime = ServerRuntime::new(
        add_numbers_port(Protocol::Soap11),
        config.resolver(registry).unwrap(),
        AddNumbersEndpoint::with_log(&log),
    )
    .with_config(config.server.to_server_config());

    let transport = LocalTransport::new();
    transport.bind("local://duke/addnumbers", runtime).unwrap();

    let dispatcher = Dispatcher::builder("local://duke/addnumbers", transport)
        .port(add_numbers_port(Protocol::Soap11))
        .executor(SharedExecutor::with_config(config.executor.to_executor_config()))
        .build()
        .unwrap();

    let request = Request::new(json!({"arg0": 4, "arg1": 6}))
        .with_options(config.dispatch.to_invocation_options());
    let response = dispatcher.invoke(request).await.unwrap();
    assert_eq!(response.payload(), &json!({"return": 10}));

    assert_eq!(
        log.lines(),
        vec![
            "ServerProtocol POST_CONSTRUCT",
            "ServerLogical POST_CONSTRUCT",
            "ServerProtocol GET_HEADERS",
            "ServerProtocol HANDLE_MESSAGE_INBOUND",
            "ServerLogical HANDLE_MESSAGE_INBOUND",
            "Endpoint INVOKE",
            "ServerLogical HANDLE_MESSAGE_OUTBOUND",
            "ServerProtocol HANDLE_MESSAGE_OUTBOUND",
            "ServerLogical CLOSE",
            "ServerProtocol CLOSE",
            "ServerLogical PRE_DESTROY",
            "ServerProtocol PRE_DESTROY",
        ]
    );
}

#[tokio::test]
async fn test_configured_async_fault() {
    let config = configured();
    let transport = LocalTransport::new();
    let runtime = ServerRuntime::new(
        add_numbers_port(Protocol::Soap11),
        StaticResolver::default(),
        AddNumbersEndpoint::new(),
    );
    transport.bind("local://duke/addnumbers", runtime).unwrap();

    let dispatcher = Dispatcher::builder("local://duke/addnumbers", transport)
        .port(add_numbers_port(Protocol::Soap11))
        .executor(SharedExecutor::with_config(config.executor.to_executor_config()))
        .build()
        .unwrap();

    let err = dispatcher
        .invoke_async(Request::new(json!({"arg0": -1, "arg1": 2})))
        .get()
        .await
        .unwrap_err();
    let fault = err.fault().unwrap();
    assert!(fault.is_protocol());
    assert_eq!(fault.fault_string(), "Negative numbers can't be added!");
}
