//! Boundary Exchanger
//!
//! Swaps edge rows with the vertical neighbours once per cycle. The rows are
//! kept on the partition for boundary-aware logic but nothing reads them
//! yet. Both sides of every link still have to take part, or the paired
//! exchange stalls. The phase ends on a full barrier, so no unit leaves it
//! before every unit has entered it.

use crate::comm::{Communicator, Tag};
use crate::error::CommError;
use crate::partition::Partition;

pub fn halo_exchange(partition: &mut Partition, comm: &Communicator) -> Result<(), CommError> {
    let neighbors = partition.neighbors;

    partition.halo_up = match neighbors.up {
        Some(up) => Some(comm.sendrecv(up, Tag::Halo, &partition.top_row())?),
        None => None,
    };
    partition.halo_down = match neighbors.down {
        Some(down) => Some(comm.sendrecv(down, Tag::Halo, &partition.bottom_row())?),
        None => None,
    };

    comm.barrier()
}
