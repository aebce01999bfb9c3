//! Direct Connect codec properties exercised through the public API.

use rand::Rng;
use uuid::Uuid;

use velolink_devices::dircon::{
    build_error_response, parse_request, parse_response, CharacteristicWrite, DiscoverServices,
    MessageCodec, MessageError, MessageType, Request, ServiceList, WriteCharacteristic,
    HEADER_LEN, UUID_LEN,
};

fn random_uuid(rng: &mut impl Rng) -> Uuid {
    let mut bytes = [0u8; UUID_LEN];
    rng.fill(&mut bytes);
    Uuid::from_bytes(bytes)
}

#[test]
fn test_short_buffers_rejected_before_type_dispatch() {
    for len in 0..HEADER_LEN {
        let buffer = vec![0xffu8; len];
        assert!(matches!(
            MessageType::from_buffer(&buffer),
            Err(MessageError::InvalidLength { .. })
        ));
        assert!(parse_request(&buffer).is_err());
        assert!(parse_response(&buffer).is_err());
    }
}

#[test]
fn test_ids_outside_the_closed_set_rejected() {
    for id in 0x07..=0xff {
        let mut frame = vec![0u8; HEADER_LEN];
        frame[1] = id;
        assert_eq!(
            MessageType::from_buffer(&frame).unwrap_err(),
            MessageError::UnknownType(id)
        );
    }
    assert_eq!(
        MessageType::from_id(0x00).unwrap_err(),
        MessageError::UnknownType(0x00)
    );
}

#[test]
fn test_service_list_round_trip_is_byte_exact() {
    let mut rng = rand::thread_rng();
    for count in 0..8 {
        let list = ServiceList {
            services: (0..count).map(|_| random_uuid(&mut rng)).collect(),
        };
        let body = DiscoverServices::build_response_body(&list);
        let parsed = DiscoverServices::parse_response_body(&body).unwrap();
        assert_eq!(parsed.services, list.services);
        // identical list, same order, byte-exact
        assert_eq!(DiscoverServices::build_response_body(&parsed), body);
    }
}

#[test]
fn test_write_round_trip_with_arbitrary_payload() {
    let mut rng = rand::thread_rng();
    for _ in 0..16 {
        let len = rng.gen_range(0..64);
        let write = CharacteristicWrite {
            characteristic_uuid: random_uuid(&mut rng),
            data: (0..len).map(|_| rng.gen()).collect(),
        };
        let body = WriteCharacteristic::build_request_body(&write);
        let parsed = WriteCharacteristic::parse_request_body(&body).unwrap();
        assert_eq!(parsed, write);
    }
}

#[test]
fn test_error_response_preserves_everything_but_status() {
    let mut rng = rand::thread_rng();
    let write = CharacteristicWrite {
        characteristic_uuid: random_uuid(&mut rng),
        data: (0..10).map(|_| rng.gen()).collect(),
    };
    let request = velolink_devices::dircon::build_request(
        &Request::WriteCharacteristic(write),
        rng.gen(),
    );

    let response = build_error_response(&request, 0x04).unwrap();
    assert_eq!(response.len(), request.len());
    for (offset, (before, after)) in request.iter().zip(response.iter()).enumerate() {
        if offset == 3 {
            assert_eq!(*after, 0x04);
        } else {
            assert_eq!(before, after, "byte {offset} changed");
        }
    }
}
