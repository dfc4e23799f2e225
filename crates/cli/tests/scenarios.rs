//! Scenario runner tests, in process.

use serde_json::{Value, json};
use serial_chooser_cli::error::CliError;
use serial_chooser_cli::run::{Report, run};
use serial_chooser_cli::scenario::Scenario;

async fn replay(scenario: Value) -> Report {
	let scenario = Scenario::from_json(&scenario.to_string()).expect("valid scenario");
	run(scenario).await.expect("scenario runs")
}

fn report_json(report: &Report) -> Value {
	serde_json::to_value(report).unwrap()
}

fn event_names(report: &Value) -> Vec<String> {
	report["events"]
		.as_array()
		.unwrap()
		.iter()
		.map(|e| e["event"].as_str().unwrap().to_string())
		.collect()
}

fn port_ids(ports: &Value) -> Vec<String> {
	ports
		.as_array()
		.unwrap()
		.iter()
		.map(|p| p["portId"].as_str().unwrap().to_string())
		.collect()
}

#[tokio::test]
async fn hot_plugged_port_is_chosen_and_granted() {
	let report = replay(json!({
		"origin": "https://maker.test",
		"ports": [
			{ "portId": "1", "path": "/dev/ttyACM0", "vendorId": 9025, "persistentId": "SN1" },
			{ "portId": "2", "path": "/dev/ttyUSB0", "vendorId": 1027 }
		],
		"filters": [{ "vendorId": 9025 }],
		"steps": [
			{ "op": "attach", "port": { "portId": "3", "path": "/dev/ttyACM1", "vendorId": 9025 } },
			{ "op": "choose", "portId": "3" }
		]
	}))
	.await;
	let json = report_json(&report);

	assert_eq!(json["blocked"], false);
	let request = &json["requests"][0];
	assert_eq!(port_ids(&request["presented"]), ["1"]);
	assert_eq!(request["outcome"]["portId"], "3");
	assert_eq!(request["outcome"]["portName"], "ttyACM1");
	assert_eq!(request["pendingAtEnd"], false);
	assert_eq!(event_names(&json), ["serial-port-added"]);
	assert_eq!(json["grants"], json!(["port:3"]));
}

#[tokio::test]
async fn events_during_enumeration_are_reconciled() {
	for hold in ["request", "release"] {
		let report = replay(json!({
			"ports": [
				{ "portId": "a", "path": "/dev/ttyS0" },
				{ "portId": "b", "path": "/dev/ttyS1" }
			],
			"holdEnumeration": hold,
			"steps": [
				{ "op": "attach", "port": { "portId": "c", "path": "/dev/ttyS2" } },
				{ "op": "detach", "portId": "a" },
				{ "op": "releaseEnumeration" },
				{ "op": "choose", "portId": "c" }
			]
		}))
		.await;
		let json = report_json(&report);

		assert_eq!(port_ids(&json["requests"][0]["presented"]), ["b", "c"], "hold at {hold}");
		assert_eq!(json["requests"][0]["outcome"]["portId"], "c");
		assert!(event_names(&json).is_empty());
	}
}

#[tokio::test]
async fn choosing_a_detached_port_returns_nothing() {
	let report = replay(json!({
		"ports": [
			{ "portId": "a", "path": "/dev/ttyS0" },
			{ "portId": "b", "path": "/dev/ttyS1" }
		],
		"steps": [
			{ "op": "detach", "portId": "a" },
			{ "op": "choose", "portId": "a" }
		]
	}))
	.await;
	let json = report_json(&report);

	assert_eq!(json["requests"][0]["outcome"], Value::Null);
	assert_eq!(event_names(&json), ["serial-port-removed"]);
	assert_eq!(json["grants"], json!([]));
}

#[tokio::test]
async fn reopen_supersedes_previous_request() {
	let report = replay(json!({
		"ports": [{ "portId": "a", "path": "/dev/ttyS0" }],
		"steps": [
			{ "op": "reopen" },
			{ "op": "choose", "portId": "a" }
		]
	}))
	.await;
	let json = report_json(&report);

	assert_eq!(json["requests"][0]["outcome"], Value::Null);
	assert_eq!(json["requests"][1]["outcome"]["portId"], "a");
	assert_eq!(event_names(&json), ["select-serial-port-cancelled"]);
}

#[tokio::test]
async fn destroyed_context_resolves_quietly() {
	let report = replay(json!({
		"ports": [{ "portId": "a", "path": "/dev/ttyS0" }],
		"steps": [{ "op": "destroyContext" }]
	}))
	.await;
	let json = report_json(&report);

	assert_eq!(json["requests"][0]["outcome"], Value::Null);
	assert_eq!(json["requests"][0]["pendingAtEnd"], false);
	assert!(event_names(&json).is_empty());
}

#[tokio::test]
async fn failed_grant_still_returns_port() {
	let report = replay(json!({
		"ports": [{ "portId": "a", "path": "/dev/ttyS0" }],
		"readOnlyPermissions": true,
		"steps": [{ "op": "choose", "portId": "a" }]
	}))
	.await;
	let json = report_json(&report);

	assert_eq!(json["requests"][0]["outcome"]["portId"], "a");
	assert_eq!(event_names(&json), ["grant-failed"]);
	assert_eq!(json["events"][0]["portId"], "a");
	assert_eq!(json["grants"], json!([]));
}

#[tokio::test]
async fn disconnect_cancels_shown_chooser() {
	let report = replay(json!({
		"ports": [{ "portId": "a", "path": "/dev/ttyS0" }],
		"steps": [{ "op": "disconnect" }]
	}))
	.await;
	let json = report_json(&report);

	assert_eq!(json["requests"][0]["outcome"], Value::Null);
	assert_eq!(event_names(&json), ["select-serial-port-cancelled"]);
}

#[tokio::test]
async fn unfinished_chooser_is_shut_down() {
	let report = replay(json!({
		"ports": [{ "portId": "a", "path": "/dev/ttyS0" }]
	}))
	.await;
	let json = report_json(&report);

	assert_eq!(json["requests"][0]["pendingAtEnd"], true);
	assert_eq!(json["requests"][0]["outcome"], Value::Null);
	assert_eq!(event_names(&json), ["select-serial-port-cancelled"]);
}

#[tokio::test]
async fn blocked_origin_is_reported() {
	let report = replay(json!({
		"origin": "https://evil.test",
		"options": { "blockedOrigins": ["https://evil.test"] },
		"ports": [{ "portId": "a", "path": "/dev/ttyS0" }]
	}))
	.await;

	assert!(report.blocked);
	assert!(report.requests.is_empty());
}

#[tokio::test]
async fn choose_without_chooser_is_a_step_error() {
	let scenario = Scenario::from_json(
		&json!({
			"ports": [{ "portId": "a", "path": "/dev/ttyS0" }],
			"holdEnumeration": "request",
			"steps": [{ "op": "choose", "portId": "a" }]
		})
		.to_string(),
	)
	.unwrap();

	let err = run(scenario).await.unwrap_err();
	assert!(matches!(err, CliError::Step { step: 1, op: "choose", .. }));
}

#[tokio::test]
async fn reopen_after_destroy_is_a_step_error() {
	let scenario = Scenario::from_json(
		&json!({
			"steps": [{ "op": "destroyContext" }, { "op": "reopen" }]
		})
		.to_string(),
	)
	.unwrap();

	let err = run(scenario).await.unwrap_err();
	assert!(err.to_string().contains("step 2 (reopen)"));
}
